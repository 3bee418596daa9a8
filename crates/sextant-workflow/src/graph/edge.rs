use std::collections::BTreeMap;
use std::sync::Arc;

/// Name of the terminal pseudo-node. Routing to it finishes the run.
pub const END: &str = "__end__";

/// Chooses an outcome name from the current state.
pub type Router<S> = Arc<dyn Fn(&S) -> String + Send + Sync>;

/// The outgoing transition of one node.
pub enum Edge<S> {
    /// Always continue to the named node.
    Always(String),
    /// Ask the router for an outcome and continue to the node it maps to.
    Conditional {
        router: Router<S>,
        outcomes: BTreeMap<String, String>,
    },
}

impl<S> Edge<S> {
    /// Every node this edge can lead to.
    pub fn targets(&self) -> Vec<&str> {
        match self {
            Edge::Always(to) => vec![to.as_str()],
            Edge::Conditional { outcomes, .. } => outcomes.values().map(|s| s.as_str()).collect(),
        }
    }

    /// Target of a named outcome; unconditional edges have none.
    pub fn outcome(&self, name: &str) -> Option<&str> {
        match self {
            Edge::Always(_) => None,
            Edge::Conditional { outcomes, .. } => outcomes.get(name).map(|s| s.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets() {
        let always: Edge<()> = Edge::Always("b".into());
        assert_eq!(always.targets(), vec!["b"]);
        assert_eq!(always.outcome("b"), None);

        let conditional: Edge<()> = Edge::Conditional {
            router: Arc::new(|_: &()| "more".to_string()),
            outcomes: [("more", "draft"), ("done", END)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };
        assert_eq!(conditional.targets(), vec![END, "draft"]);
        assert_eq!(conditional.outcome("more"), Some("draft"));
        assert_eq!(conditional.outcome("other"), None);
    }
}
