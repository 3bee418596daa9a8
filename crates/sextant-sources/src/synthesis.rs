use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use sextant_core::config::ModelConfig;
use sextant_core::error::Result;
use sextant_core::traits::LlmClient;
use sextant_core::types::{CompletionRequest, Coverage, ResearchBundle};

const MAX_ITEMS_PER_SOURCE: usize = 8;

const SYSTEM_PROMPT: &str = "You summarize research evidence. Use only facts and figures \
that appear in the evidence below. Never estimate or invent numbers. When a topic has no \
supporting evidence, say so plainly instead of guessing.";

/// Result of a synthesis pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Synthesis {
    pub summary: String,
    /// Sources and sub-topics with no supporting evidence.
    pub absent: Vec<String>,
    /// Sentences dropped as unsupported by the evidence.
    pub removed_sentences: Vec<String>,
    pub coverage: Option<Coverage>,
}

/// Summarizes a research bundle, restricted to the evidence it carries.
pub struct Synthesizer {
    llm: Arc<dyn LlmClient>,
    model: ModelConfig,
}

impl Synthesizer {
    pub fn new(llm: Arc<dyn LlmClient>, model: ModelConfig) -> Self {
        Self { llm, model }
    }

    /// Summarize `bundle` for `topic`, covering each of `sub_topics` that the
    /// evidence supports. The summary never quotes a figure that is absent
    /// from every payload and always names what had no evidence.
    pub async fn synthesize(
        &self,
        topic: &str,
        sub_topics: &[String],
        bundle: &ResearchBundle,
    ) -> Result<Synthesis> {
        let evidence = bundle.evidence_text();
        let absent = absent_subjects(sub_topics, bundle, &evidence);
        let coverage = bundle.coverage();

        if coverage == Coverage::None {
            debug!(topic, "No evidence to synthesize");
            return Ok(Synthesis {
                summary: absence_note(&absent),
                absent,
                removed_sentences: vec![],
                coverage: Some(coverage),
            });
        }

        let mut prompt = format!("Topic: {}\n\n", topic);
        if !sub_topics.is_empty() {
            prompt.push_str(&format!("Sub-topics: {}\n\n", sub_topics.join(", ")));
        }
        prompt.push_str("Evidence:\n");
        prompt.push_str(&bundle.render(MAX_ITEMS_PER_SOURCE));
        if !absent.is_empty() {
            prompt.push_str(&format!("No evidence is available for: {}\n", absent.join(", ")));
        }

        let draft = self
            .llm
            .complete(
                &self.model,
                CompletionRequest::new(prompt).with_system(SYSTEM_PROMPT),
            )
            .await?;

        // Figures may also come from the question itself
        let allowed = numbers(&format!("{}\n{}\n{}", evidence, topic, sub_topics.join("\n")));
        let (kept, removed) = ground(&draft, &allowed, &unavailable_names(bundle));
        if !removed.is_empty() {
            warn!(topic, removed = removed.len(), "Dropped unsupported sentences from synthesis");
        }

        let mut summary = kept;
        let note = absence_note(&absent);
        if !note.is_empty() {
            if !summary.is_empty() {
                summary.push_str("\n\n");
            }
            summary.push_str(&note);
        }

        Ok(Synthesis {
            summary,
            absent,
            removed_sentences: removed,
            coverage: Some(coverage),
        })
    }
}

fn figure_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?P<currency>[$€£¥])?\s?(?P<number>\d[\d,]*(?:\.\d+)?)(?P<unit>%|\s?(?:percent|billion|million|trillion|thousand|bn)\b|[kKmMbBtT]\b)?",
        )
        .unwrap()
    })
}

fn normalize_number(number: &str) -> String {
    number.trim_end_matches(',').replace(',', "")
}

/// Every number in `text`, normalized. This is the reference a quoted
/// figure must be found in.
pub fn numbers(text: &str) -> HashSet<String> {
    figure_pattern()
        .captures_iter(text)
        .filter_map(|c| c.name("number"))
        .map(|m| normalize_number(m.as_str()))
        .collect()
}

/// Figures quoted in `text`, normalized. A bare single digit is ignored, as
/// it is a list marker or small count far more often than data; with a
/// currency sign or a unit (`7%`, `$3B`) it is a figure.
pub fn figures(text: &str) -> HashSet<String> {
    figure_pattern()
        .captures_iter(text)
        .filter_map(|c| {
            let number = normalize_number(c.name("number")?.as_str());
            let qualified = c.name("currency").is_some() || c.name("unit").is_some();
            (qualified || number.len() > 1).then_some(number)
        })
        .collect()
}

/// Split text into sentences, keeping decimals like `3.5` intact.
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        let boundary = match b {
            b'\n' => true,
            b'.' | b'!' | b'?' => bytes.get(i + 1).map_or(true, |n| n.is_ascii_whitespace()),
            _ => false,
        };
        if boundary {
            let s = text[start..=i].trim();
            if !s.is_empty() {
                out.push(s);
            }
            start = i + 1;
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

/// Drop sentences that quote unsupported figures or make claims about
/// sources that returned nothing. Returns the kept text and the dropped
/// sentences.
fn ground(text: &str, allowed: &HashSet<String>, unavailable: &[String]) -> (String, Vec<String>) {
    let mut kept = Vec::new();
    let mut removed = Vec::new();

    for sentence in sentences(text) {
        let unsupported_figure = figures(sentence).iter().any(|f| !allowed.contains(f));
        let lower = sentence.to_lowercase();
        let states_absence = lower.contains("no evidence")
            || lower.contains("unavailable")
            || lower.contains("not available");
        let claims_absent_source = !states_absence
            && lower
                .split(|c: char| !c.is_alphanumeric() && c != '_')
                .any(|word| unavailable.iter().any(|name| name == word));

        if unsupported_figure || claims_absent_source {
            removed.push(sentence.to_string());
        } else {
            kept.push(sentence);
        }
    }

    (kept.join(" "), removed)
}

/// Source names (lowercased) that contributed no items.
fn unavailable_names(bundle: &ResearchBundle) -> Vec<String> {
    bundle
        .absent_sources()
        .into_iter()
        .map(|s| s.to_lowercase())
        .collect()
}

/// Absent sources plus sub-topics with no matching word in the evidence.
fn absent_subjects(sub_topics: &[String], bundle: &ResearchBundle, evidence: &str) -> Vec<String> {
    let mut absent: Vec<String> = bundle
        .absent_sources()
        .into_iter()
        .map(str::to_string)
        .collect();

    let evidence = evidence.to_lowercase();
    for topic in sub_topics {
        let covered = topic
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 3)
            .any(|w| evidence.contains(&w.to_lowercase()));
        if !covered {
            absent.push(topic.clone());
        }
    }
    absent
}

fn absence_note(absent: &[String]) -> String {
    if absent.is_empty() {
        String::new()
    } else {
        format!("No evidence was available for: {}.", absent.join(", "))
    }
}
