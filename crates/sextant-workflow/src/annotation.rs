use std::fmt;

use serde::{Deserialize, Serialize};

use sextant_core::types::Coverage;

/// How far an artifact can be trusted, given the evidence behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// Full coverage with no caveats is high; any caveat or partial coverage
    /// is medium; no evidence at all is low.
    pub fn assess(coverage: Coverage, caveats: bool) -> Self {
        match coverage {
            Coverage::Full if !caveats => Confidence::High,
            Coverage::Full | Coverage::Partial => Confidence::Medium,
            Coverage::None => Confidence::Low,
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::High => write!(f, "High"),
            Confidence::Medium => write!(f, "Medium"),
            Confidence::Low => write!(f, "Low"),
        }
    }
}

/// Assumption lines explaining which parts of an artifact lack evidence.
pub fn evidence_assumptions(coverage: Coverage, absent_sources: &[&str]) -> Vec<String> {
    match coverage {
        Coverage::None => vec![
            "No external evidence was retrieved; content reflects the model's general knowledge only."
                .to_string(),
        ],
        _ if !absent_sources.is_empty() => vec![format!(
            "No evidence was retrieved from: {}. Content in those areas relies on general knowledge.",
            absent_sources.join(", ")
        )],
        _ => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assess() {
        assert_eq!(Confidence::assess(Coverage::Full, false), Confidence::High);
        assert_eq!(Confidence::assess(Coverage::Full, true), Confidence::Medium);
        assert_eq!(Confidence::assess(Coverage::Partial, false), Confidence::Medium);
        assert_eq!(Confidence::assess(Coverage::None, false), Confidence::Low);
        assert_eq!(Confidence::Low.to_string(), "Low");
    }

    #[test]
    fn test_evidence_assumptions() {
        assert!(evidence_assumptions(Coverage::Full, &[]).is_empty());
        assert_eq!(
            evidence_assumptions(Coverage::Partial, &["youtube"]),
            vec!["No evidence was retrieved from: youtube. Content in those areas relies on general knowledge."]
        );
        assert!(evidence_assumptions(Coverage::None, &["a"])[0].starts_with("No external evidence"));
    }
}
