use std::collections::HashSet;

use tracing::{debug, warn};

use sextant_core::error::Result;
use sextant_core::types::Coverage;
use sextant_sources::synthesis::{figures, numbers};
use sextant_sources::Synthesizer;

use super::nodes::COMPLETION_SENTINEL;
use super::state::ReportState;
use crate::annotation::{evidence_assumptions, Confidence};

pub const DISCLAIMER: &str = "This report is for informational purposes only and does not \
constitute investment advice. Verify all figures against primary sources before acting on them.";

/// Turns drafted sections into the final report.
///
/// Sections keep their drafting order. A section whose text, or whose
/// heading, repeats an earlier one is dropped. When anything in the report
/// is not backed by the gathered evidence an "Assumptions & Confidence"
/// block is appended before the disclaimer.
#[derive(Default)]
pub struct ReportAssembler {
    synthesizer: Option<Synthesizer>,
}

impl ReportAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an evidence summary produced by `synthesizer`.
    pub fn with_synthesizer(mut self, synthesizer: Synthesizer) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    pub async fn assemble(&self, state: &ReportState) -> Result<String> {
        let sections = dedupe_sections(&state.sections());
        let coverage = state
            .evidence
            .as_ref()
            .map(|b| b.coverage())
            .unwrap_or(Coverage::None);
        let absent = state
            .evidence
            .as_ref()
            .map(|b| b.absent_sources())
            .unwrap_or_default();

        let mut out = match state.subject() {
            Some(subject) => format!("# Equity Research Report: {}\n\n", subject),
            None => "# Equity Research Report\n\n".to_string(),
        };
        out.push_str(&format!("**Question:** {}\n\n", state.question));
        out.push_str(&sections.join("\n\n"));

        let mut removed_claims = 0;
        if let (Some(synthesizer), Some(bundle)) = (&self.synthesizer, &state.evidence) {
            match synthesizer.synthesize(&state.question, &[], bundle).await {
                Ok(synthesis) => {
                    removed_claims = synthesis.removed_sentences.len();
                    out.push_str("\n\n## Evidence Summary\n\n");
                    out.push_str(&synthesis.summary);
                }
                // The summary is supplementary; the report stands without it
                Err(e) => warn!(error = %e, "Evidence summary failed, assembling without it"),
            }
        }

        let unsupported = unsupported_figures(state, &sections);
        let truncated = !state.is_complete();

        let mut assumptions = evidence_assumptions(coverage, &absent);
        if !unsupported.is_empty() {
            assumptions.push(format!(
                "Figures not found in the retrieved evidence are estimates: {}.",
                unsupported.join(", ")
            ));
        }
        if removed_claims > 0 {
            assumptions.push(format!(
                "{} unsupported statement(s) were removed from the evidence summary.",
                removed_claims
            ));
        }
        if truncated {
            assumptions.push(
                "Drafting stopped at the section limit before the plan was reported complete; \
                 some planned sections may be missing."
                    .to_string(),
            );
        }

        if !assumptions.is_empty() {
            let confidence = Confidence::assess(coverage, !unsupported.is_empty() || truncated);
            out.push_str("\n\n## Assumptions & Confidence\n\n");
            for line in &assumptions {
                out.push_str(&format!("- {}\n", line));
            }
            out.push_str(&format!("\n**Confidence Level:** {}\n", confidence));
        }

        out.push_str(&format!("\n---\n\n_{}_\n", DISCLAIMER));

        debug!(
            sections = sections.len(),
            dropped = state.sections().len() - sections.len(),
            annotated = !assumptions.is_empty(),
            "Report assembled"
        );
        Ok(out)
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Markdown heading on the first line, normalized.
fn heading(section: &str) -> Option<String> {
    let first = section.lines().next()?.trim();
    first
        .starts_with('#')
        .then(|| normalize(first.trim_start_matches('#')))
        .filter(|h| !h.is_empty())
}

/// Drop sections already covered by an earlier one, keeping order.
pub fn dedupe_sections<'a>(sections: &[&'a str]) -> Vec<&'a str> {
    let mut seen_text = HashSet::new();
    let mut seen_headings = HashSet::new();
    let mut kept = Vec::new();

    for &section in sections {
        let section = section.trim();
        if section.is_empty() || section == COMPLETION_SENTINEL {
            continue;
        }
        if !seen_text.insert(normalize(section)) {
            continue;
        }
        if let Some(h) = heading(section) {
            if !seen_headings.insert(h) {
                continue;
            }
        }
        kept.push(section);
    }
    kept
}

/// Figures quoted in the report that appear neither in the evidence nor in
/// the request itself.
fn unsupported_figures(state: &ReportState, sections: &[&str]) -> Vec<String> {
    let mut reference = state
        .evidence
        .as_ref()
        .map(|b| b.evidence_text())
        .unwrap_or_default();
    reference.push('\n');
    reference.push_str(&state.question);
    if let Some(subject) = state.subject() {
        reference.push('\n');
        reference.push_str(&subject);
    }
    let allowed = numbers(&reference);

    let mut unsupported: Vec<String> = figures(&sections.join("\n"))
        .into_iter()
        .filter(|f| !allowed.contains(f))
        .collect();
    unsupported.sort();
    unsupported
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use sextant_core::config::ModelConfig;
    use sextant_core::types::{ResearchBundle, SourceContribution, SourceItem, SourcePayload};
    use sextant_test_utils::MockLlm;

    use crate::graph::WorkflowState;
    use crate::report::state::{DraftFragment, ReportUpdate};

    fn evidence(full: bool) -> ResearchBundle {
        let mut bundle = ResearchBundle::new("q");
        bundle.insert(
            "web_search",
            SourceContribution::Found(SourcePayload::new(vec![SourceItem::new(
                "Apple Q3",
                "Revenue of 85.8 billion, up 5%",
            )])),
        );
        if full {
            bundle.insert(
                "news_search",
                SourceContribution::Found(SourcePayload::new(vec![SourceItem::new("News", "Buyback announced")])),
            );
        } else {
            bundle.insert("news_search", SourceContribution::unavailable("HTTP 503"));
        }
        bundle
    }

    fn state(fragments: Vec<DraftFragment>, bundle: ResearchBundle) -> ReportState {
        let mut state = ReportState::new("Should I buy Apple?", "m")
            .with_symbol(Some("AAPL".into()))
            .with_name(Some("Apple".into()));
        state.apply(ReportUpdate::Evidence(bundle));
        state.apply(ReportUpdate::Drafted(fragments));
        state
    }

    fn section(text: &str) -> DraftFragment {
        DraftFragment::Section(text.into())
    }

    #[test]
    fn test_dedupe_keeps_order() {
        let kept = dedupe_sections(&[
            "## Overview\nApple makes phones.",
            "## Risks\nSupply chain.",
            "##  overview\nApple designs hardware.",
            "## Risks\nSupply   chain.",
            "PLAN_COMPLETE",
            "Closing thoughts.",
        ]);
        assert_eq!(
            kept,
            vec!["## Overview\nApple makes phones.", "## Risks\nSupply chain.", "Closing thoughts."]
        );
    }

    #[tokio::test]
    async fn test_fully_evidenced_report_has_no_annotation() {
        let state = state(
            vec![section("## Financials\nRevenue was 85.8 billion."), DraftFragment::Complete],
            evidence(true),
        );
        let report = ReportAssembler::new().assemble(&state).await.unwrap();

        assert!(report.starts_with("# Equity Research Report: Apple (AAPL)"));
        assert!(report.contains("Revenue was 85.8 billion."));
        assert!(!report.contains("Assumptions & Confidence"));
        assert!(!report.contains("PLAN_COMPLETE"));
        assert!(report.trim_end().ends_with(&format!("_{}_", DISCLAIMER)));
    }

    #[tokio::test]
    async fn test_unsupported_figures_are_annotated() {
        let state = state(
            vec![
                section("## Valuation\nFair value is 240 per share on 31x earnings."),
                DraftFragment::Complete,
            ],
            evidence(false),
        );
        let report = ReportAssembler::new().assemble(&state).await.unwrap();

        assert!(report.contains("## Assumptions & Confidence"));
        assert!(report.contains("No evidence was retrieved from: news_search."));
        assert!(report.contains("estimates: 240, 31."));
        assert!(report.contains("**Confidence Level:** Medium"));
    }

    #[tokio::test]
    async fn test_small_qualified_figures_need_evidence() {
        let state = state(
            vec![
                section("## Growth\nRevenue rose 5% while services grew 8% in step 2."),
                DraftFragment::Complete,
            ],
            evidence(true),
        );
        let report = ReportAssembler::new().assemble(&state).await.unwrap();

        assert!(report.contains("Figures not found in the retrieved evidence are estimates: 8."));
        assert!(report.contains("**Confidence Level:** Medium"));
    }

    #[tokio::test]
    async fn test_truncated_draft_and_no_evidence() {
        let mut bundle = ResearchBundle::new("q");
        bundle.insert("web_search", SourceContribution::unavailable("down"));
        let state = state(vec![section("S1"), section("S2")], bundle);

        let report = ReportAssembler::new().assemble(&state).await.unwrap();
        assert!(report.contains("S1\n\nS2"));
        assert!(report.contains("No external evidence was retrieved"));
        assert!(report.contains("some planned sections may be missing"));
        assert!(report.contains("**Confidence Level:** Low"));
    }

    #[tokio::test]
    async fn test_evidence_summary_from_synthesizer() {
        let llm = MockLlm::with_default("Revenue reached 85.8 billion. Margins hit 99%.");
        let assembler = ReportAssembler::new()
            .with_synthesizer(Synthesizer::new(Arc::new(llm), ModelConfig::new("m")));
        let state = state(vec![section("S1"), DraftFragment::Complete], evidence(true));

        let report = assembler.assemble(&state).await.unwrap();
        assert!(report.contains("## Evidence Summary\n\nRevenue reached 85.8 billion."));
        assert!(!report.contains("99%"));
        assert!(report.contains("1 unsupported statement(s) were removed"));
    }

    #[tokio::test]
    async fn test_failed_summary_is_skipped() {
        let assembler = ReportAssembler::new()
            .with_synthesizer(Synthesizer::new(Arc::new(MockLlm::new()), ModelConfig::new("m")));
        let state = state(vec![section("S1"), DraftFragment::Complete], evidence(true));

        let report = assembler.assemble(&state).await.unwrap();
        assert!(!report.contains("Evidence Summary"));
        assert!(report.contains("S1"));
    }
}
