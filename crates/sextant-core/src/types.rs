use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one workflow run.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Query parameters for a source adapter.
///
/// Keys are kept in a `BTreeMap` so iteration order never depends on the order
/// parameters were inserted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryParams(BTreeMap<String, serde_json::Value>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(|v| v.as_u64())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<serde_json::Value>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// One record returned by an external data provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceItem {
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub snippet: String,
    /// Provider-specific popularity signal (stars, views, points).
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl SourceItem {
    pub fn new(title: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            snippet: snippet.into(),
            ..Default::default()
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }
}

/// Successful adapter response. An empty `items` list means "no data", which
/// is distinct from a failed call (an `Err` from the adapter).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourcePayload {
    pub items: Vec<SourceItem>,
}

impl SourcePayload {
    pub fn new(items: Vec<SourceItem>) -> Self {
        Self { items }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// All text carried by this payload, used for evidence checks.
    pub fn text(&self) -> String {
        self.items
            .iter()
            .map(|i| format!("{}\n{}", i.title, i.snippet))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// What one source contributed to a research bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceContribution {
    Found(SourcePayload),
    Unavailable { reason: String },
}

impl SourceContribution {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn payload(&self) -> Option<&SourcePayload> {
        match self {
            Self::Found(p) => Some(p),
            Self::Unavailable { .. } => None,
        }
    }

    /// True when the source produced at least one item.
    pub fn has_evidence(&self) -> bool {
        self.payload().is_some_and(|p| !p.is_empty())
    }
}

/// How much of a bundle is backed by real evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Coverage {
    Full,
    Partial,
    None,
}

/// Merged per-source results. Every requested source name is present; failure
/// is expressed as `SourceContribution::Unavailable`, never by absence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchBundle {
    pub topic: String,
    pub sources: BTreeMap<String, SourceContribution>,
}

impl ResearchBundle {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            sources: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, source: impl Into<String>, contribution: SourceContribution) {
        self.sources.insert(source.into(), contribution);
    }

    pub fn get(&self, source: &str) -> Option<&SourceContribution> {
        self.sources.get(source)
    }

    /// Source names that produced at least one item.
    pub fn evidenced_sources(&self) -> Vec<&str> {
        self.sources
            .iter()
            .filter(|(_, c)| c.has_evidence())
            .map(|(k, _)| k.as_str())
            .collect()
    }

    /// Source names that failed or returned nothing.
    pub fn absent_sources(&self) -> Vec<&str> {
        self.sources
            .iter()
            .filter(|(_, c)| !c.has_evidence())
            .map(|(k, _)| k.as_str())
            .collect()
    }

    pub fn coverage(&self) -> Coverage {
        let evidenced = self.evidenced_sources().len();
        if evidenced == 0 {
            Coverage::None
        } else if evidenced == self.sources.len() {
            Coverage::Full
        } else {
            Coverage::Partial
        }
    }

    /// Concatenated text of all successful payloads.
    pub fn evidence_text(&self) -> String {
        self.sources
            .values()
            .filter_map(SourceContribution::payload)
            .map(SourcePayload::text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Render the evidence as a prompt block, one section per source.
    pub fn render(&self, max_items_per_source: usize) -> String {
        let mut out = String::new();
        for (name, contribution) in &self.sources {
            out.push_str(&format!("### {}\n", name));
            match contribution {
                SourceContribution::Found(p) if !p.is_empty() => {
                    for item in p.items.iter().take(max_items_per_source) {
                        out.push_str(&format!("- {}: {}", item.title, item.snippet));
                        if let Some(ref url) = item.url {
                            out.push_str(&format!(" ({})", url));
                        }
                        out.push('\n');
                    }
                }
                SourceContribution::Found(_) => out.push_str("(no results)\n"),
                SourceContribution::Unavailable { .. } => out.push_str("(unavailable)\n"),
            }
            out.push('\n');
        }
        out
    }
}

/// A single request to the generative backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionRequest {
    #[serde(default)]
    pub system: Option<String>,
    pub prompt: String,
    /// Overrides the model's configured temperature.
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Ask the backend for a JSON object response.
    #[serde(default)]
    pub json: bool,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn json(mut self) -> Self {
        self.json = true;
        self
    }
}

/// Terminal status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// Per-stage lifecycle events published on the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    RunStarted {
        run_id: RunId,
        workflow: String,
    },
    StageStarted {
        run_id: RunId,
        node: String,
        iteration: usize,
    },
    StageCompleted {
        run_id: RunId,
        node: String,
        iteration: usize,
        elapsed_ms: u64,
    },
    StageFailed {
        run_id: RunId,
        node: String,
        error: String,
    },
    IterationCapReached {
        run_id: RunId,
        node: String,
        cap: usize,
    },
    RunFinished {
        run_id: RunId,
        status: RunStatus,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(n: usize) -> SourcePayload {
        SourcePayload::new(
            (0..n)
                .map(|i| SourceItem::new(format!("item {}", i), "snippet"))
                .collect(),
        )
    }

    #[test]
    fn test_query_params_order_independent() {
        let a = QueryParams::new().with("q", "x").with("n", 10);
        let b = QueryParams::new().with("n", 10).with("q", "x");
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_bundle_coverage() {
        let mut bundle = ResearchBundle::new("rust");
        bundle.insert("a", SourceContribution::Found(payload(5)));
        assert_eq!(bundle.coverage(), Coverage::Full);

        bundle.insert("b", SourceContribution::unavailable("timeout"));
        bundle.insert("c", SourceContribution::Found(payload(0)));
        assert_eq!(bundle.coverage(), Coverage::Partial);
        assert_eq!(bundle.evidenced_sources(), vec!["a"]);
        assert_eq!(bundle.absent_sources(), vec!["b", "c"]);
    }

    #[test]
    fn test_empty_bundle_has_no_coverage() {
        let bundle = ResearchBundle::new("rust");
        assert_eq!(bundle.coverage(), Coverage::None);
        assert!(bundle.evidence_text().is_empty());
    }

    #[test]
    fn test_render_marks_unavailable() {
        let mut bundle = ResearchBundle::new("rust");
        bundle.insert("b", SourceContribution::unavailable("boom"));
        bundle.insert("c", SourceContribution::Found(payload(0)));
        let text = bundle.render(3);
        assert!(text.contains("### b\n(unavailable)"));
        assert!(text.contains("### c\n(no results)"));
    }

    #[test]
    fn test_contribution_serialization() {
        let c = SourceContribution::unavailable("timeout");
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["status"], "unavailable");
        assert_eq!(json["reason"], "timeout");
    }
}
