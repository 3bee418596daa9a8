use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use sextant_core::config::{ModelConfig, StructuredRetryConfig};
use sextant_core::error::{Result, SextantError};
use sextant_core::traits::LlmClient;
use sextant_core::types::CompletionRequest;

/// Retry policy for structured (JSON) generation.
///
/// Only malformed output is retried here; transport retries belong to
/// [`RetryingClient`](crate::RetryingClient). Each attempt lowers the
/// sampling temperature according to the schedule.
#[derive(Debug, Clone)]
pub struct StructuredRetryPolicy {
    pub max_attempts: u32,
    pub temperature_schedule: Vec<f32>,
}

impl Default for StructuredRetryPolicy {
    fn default() -> Self {
        Self::from(&StructuredRetryConfig::default())
    }
}

impl From<&StructuredRetryConfig> for StructuredRetryPolicy {
    fn from(config: &StructuredRetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            temperature_schedule: config.temperature_schedule.clone(),
        }
    }
}

impl StructuredRetryPolicy {
    /// Temperature for a zero-based attempt. The last scheduled value repeats;
    /// an empty schedule defers to the model's configured temperature.
    pub fn temperature(&self, attempt: u32) -> Option<f32> {
        self.temperature_schedule
            .get(attempt as usize)
            .or_else(|| self.temperature_schedule.last())
            .copied()
    }

    /// Ask for a JSON object and deserialize it into `T`, retrying on
    /// malformed output.
    pub async fn generate<T: DeserializeOwned>(
        &self,
        llm: &dyn LlmClient,
        model: &ModelConfig,
        request: CompletionRequest,
    ) -> Result<T> {
        let mut last_err = None;

        for attempt in 0..self.max_attempts {
            let mut req = request.clone().json();
            if let Some(t) = self.temperature(attempt) {
                req = req.with_temperature(t);
            }

            let raw = llm.complete(model, req).await?;
            match parse_structured::<T>(&model.model_id, &raw) {
                Ok(value) => {
                    debug!(attempt = attempt + 1, "Structured output parsed");
                    return Ok(value);
                }
                Err(e) => {
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Malformed structured output"
                    );
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            SextantError::malformed(&model.model_id, "no structured output attempts were made")
        }))
    }
}

/// Pull the JSON object out of a completion: strips markdown fences and any
/// prose around the outermost braces.
pub fn extract_json(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

fn parse_structured<T: DeserializeOwned>(target: &str, raw: &str) -> Result<T> {
    let json = extract_json(raw)
        .ok_or_else(|| SextantError::malformed(target, "no JSON object in completion"))?;
    serde_json::from_str(json).map_err(|e| SextantError::malformed(target, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use sextant_test_utils::MockLlm;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Gaps {
        critical_gaps: Vec<String>,
    }

    #[test]
    fn test_extract_json_from_fenced_block() {
        let raw = "Here you go:\n```json\n{\"a\": {\"b\": 1}}\n```\n";
        assert_eq!(extract_json(raw), Some("{\"a\": {\"b\": 1}}"));
        assert_eq!(extract_json("no object"), None);
        assert_eq!(extract_json("} backwards {"), None);
    }

    #[test]
    fn test_temperature_schedule_repeats_last() {
        let policy = StructuredRetryPolicy {
            max_attempts: 5,
            temperature_schedule: vec![0.7, 0.4, 0.1],
        };
        assert_eq!(policy.temperature(0), Some(0.7));
        assert_eq!(policy.temperature(2), Some(0.1));
        assert_eq!(policy.temperature(4), Some(0.1));

        let empty = StructuredRetryPolicy {
            max_attempts: 1,
            temperature_schedule: vec![],
        };
        assert_eq!(empty.temperature(0), None);
    }

    #[tokio::test]
    async fn test_retries_malformed_with_lower_temperature() {
        let llm = MockLlm::new();
        llm.push_ok("I think the gaps are tokio and serde");
        llm.push_ok("```json\n{\"critical_gaps\": [\"tokio\"]}\n```");

        let policy = StructuredRetryPolicy::default();
        let gaps: Gaps = policy
            .generate(&llm, &ModelConfig::new("m"), CompletionRequest::new("gaps?"))
            .await
            .unwrap();

        assert_eq!(gaps.critical_gaps, vec!["tokio"]);
        let requests = llm.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].temperature, Some(0.7));
        assert_eq!(requests[1].temperature, Some(0.4));
        assert!(requests.iter().all(|r| r.json));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let llm = MockLlm::with_default("{\"wrong\": true}");
        let policy = StructuredRetryPolicy {
            max_attempts: 2,
            temperature_schedule: vec![0.5],
        };
        let err = policy
            .generate::<Gaps>(&llm, &ModelConfig::new("m"), CompletionRequest::new("gaps?"))
            .await
            .unwrap_err();
        assert!(matches!(err, SextantError::MalformedResponse { .. }));
        assert_eq!(llm.call_count(), 2);
    }

    #[tokio::test]
    async fn test_transport_error_is_not_retried() {
        let llm = MockLlm::new();
        llm.push_err(SextantError::transport("m", "HTTP 401 Unauthorized: x"));
        let err = StructuredRetryPolicy::default()
            .generate::<Gaps>(&llm, &ModelConfig::new("m"), CompletionRequest::new("gaps?"))
            .await
            .unwrap_err();
        assert!(err.is_transport());
        assert_eq!(llm.call_count(), 1);
    }
}
