use serde::{Deserialize, Serialize};

use sextant_core::types::ResearchBundle;

use crate::graph::WorkflowState;

/// One unit of drafted output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum DraftFragment {
    Section(String),
    /// The drafter reports that every planned section is covered.
    Complete,
}

/// State of one financial-report run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportState {
    pub question: String,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub plan: Option<String>,
    pub evidence: Option<ResearchBundle>,
    /// Drafted fragments in the order they were produced.
    pub fragments: Vec<DraftFragment>,
    pub final_report: Option<String>,
    pub model: String,
    pub error: Option<String>,
}

/// Partial update returned by each report stage.
#[derive(Debug, Clone)]
pub enum ReportUpdate {
    Plan(String),
    Evidence(ResearchBundle),
    Drafted(Vec<DraftFragment>),
    Report(String),
}

impl ReportState {
    pub fn new(question: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_symbol(mut self, symbol: Option<String>) -> Self {
        self.symbol = symbol.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name.filter(|s| !s.trim().is_empty());
        self
    }

    /// Drafted section texts, in order, without the completion marker.
    pub fn sections(&self) -> Vec<&str> {
        self.fragments
            .iter()
            .filter_map(|f| match f {
                DraftFragment::Section(text) => Some(text.as_str()),
                DraftFragment::Complete => None,
            })
            .collect()
    }

    pub fn latest_fragment(&self) -> Option<&DraftFragment> {
        self.fragments.last()
    }

    pub fn is_complete(&self) -> bool {
        self.latest_fragment() == Some(&DraftFragment::Complete)
    }

    /// `"NAME (SYM)"`, whichever parts are known.
    pub fn subject(&self) -> Option<String> {
        match (&self.name, &self.symbol) {
            (Some(name), Some(symbol)) => Some(format!("{} ({})", name, symbol)),
            (Some(one), None) | (None, Some(one)) => Some(one.clone()),
            (None, None) => None,
        }
    }
}

impl WorkflowState for ReportState {
    type Update = ReportUpdate;

    fn apply(&mut self, update: ReportUpdate) {
        match update {
            ReportUpdate::Plan(plan) => self.plan = Some(plan),
            ReportUpdate::Evidence(bundle) => self.evidence = Some(bundle),
            ReportUpdate::Drafted(fragments) => self.fragments.extend(fragments),
            ReportUpdate::Report(report) => self.final_report = Some(report),
        }
    }

    fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn set_error(&mut self, error: String) {
        self.error = Some(error);
    }
}
