use thiserror::Error;

#[derive(Debug, Error)]
pub enum SextantError {
    // External call errors
    #[error("Transport error: {target}: {message}")]
    Transport { target: String, message: String },

    #[error("Timed out after {timeout_ms}ms: {target}")]
    Timeout { target: String, timeout_ms: u64 },

    #[error("Malformed response from {target}: {message}")]
    MalformedResponse { target: String, message: String },

    // Workflow errors
    #[error("Workflow exhausted: node '{node}' reached its cap of {cap}")]
    WorkflowExhausted { node: String, cap: usize },

    #[error("Graph error: {0}")]
    Graph(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Storage errors
    #[error("Database error: {0}")]
    Database(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SextantError {
    pub fn transport(target: impl Into<String>, message: impl ToString) -> Self {
        Self::Transport {
            target: target.into(),
            message: message.to_string(),
        }
    }

    pub fn malformed(target: impl Into<String>, message: impl ToString) -> Self {
        Self::MalformedResponse {
            target: target.into(),
            message: message.to_string(),
        }
    }

    /// Network failures and timeouts are handled identically by callers.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, SextantError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_transport() {
        let e = SextantError::Timeout {
            target: "web_search".into(),
            timeout_ms: 20_000,
        };
        assert!(e.is_transport());
        assert_eq!(e.to_string(), "Timed out after 20000ms: web_search");
    }

    #[test]
    fn test_malformed_is_not_transport() {
        let e = SextantError::malformed("llm", "expected value at line 1");
        assert!(!e.is_transport());
        assert!(e.to_string().contains("Malformed response from llm"));
    }
}
