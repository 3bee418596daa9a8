use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{info, warn};

use sextant_core::config::{ModelConfig, RetryConfig};
use sextant_core::error::{Result, SextantError};
use sextant_core::traits::LlmClient;
use sextant_core::types::CompletionRequest;

/// An LLM client that retries failed requests and falls back to alternative models.
pub struct RetryingClient {
    primary: Box<dyn LlmClient>,
    fallbacks: Vec<(ModelConfig, Box<dyn LlmClient>)>,
    retry_config: RetryConfig,
}

impl RetryingClient {
    pub fn new(
        primary: Box<dyn LlmClient>,
        fallbacks: Vec<(ModelConfig, Box<dyn LlmClient>)>,
        retry_config: RetryConfig,
    ) -> Self {
        Self {
            primary,
            fallbacks,
            retry_config,
        }
    }
}

fn is_retryable(e: &SextantError) -> bool {
    match e {
        SextantError::Transport { message, .. } => {
            let msg = message.to_lowercase();
            msg.contains("429")
                || msg.contains("500")
                || msg.contains("502")
                || msg.contains("503")
                || msg.contains("timeout")
                || msg.contains("connection")
        }
        SextantError::Timeout { .. } => true,
        _ => false,
    }
}

fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let ms = config
        .initial_backoff_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(config.max_backoff_ms);
    // Add jitter: 0.8x to 1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

impl LlmClient for RetryingClient {
    fn complete(
        &self,
        config: &ModelConfig,
        request: CompletionRequest,
    ) -> BoxFuture<'_, Result<String>> {
        let config = config.clone();

        Box::pin(async move {
            let max_retries = self.retry_config.max_retries;

            // Try primary with retries
            let mut last_err = None;
            for attempt in 0..=max_retries {
                match self.primary.complete(&config, request.clone()).await {
                    Ok(text) => return Ok(text),
                    Err(e) => {
                        if is_retryable(&e) && attempt < max_retries {
                            let backoff = calculate_backoff(attempt, &self.retry_config);
                            warn!(
                                attempt = attempt + 1,
                                max_retries,
                                backoff_ms = backoff.as_millis() as u64,
                                error = %e,
                                "Retrying LLM request"
                            );
                            tokio::time::sleep(backoff).await;
                            last_err = Some(e);
                            continue;
                        }
                        last_err = Some(e);
                        break;
                    }
                }
            }

            // Malformed output is the caller's to retry; other models won't help
            let last_err = match last_err {
                Some(e) if !e.is_transport() => return Err(e),
                other => other,
            };

            if !self.fallbacks.is_empty() {
                info!("Primary LLM exhausted, trying fallback models");
            }
            for (fb_config, fb_client) in &self.fallbacks {
                match fb_client.complete(fb_config, request.clone()).await {
                    Ok(text) => {
                        info!(
                            model = %fb_config.model_id,
                            provider = %fb_config.provider,
                            "Fell back to alternative model"
                        );
                        return Ok(text);
                    }
                    Err(e) => {
                        warn!(
                            model = %fb_config.model_id,
                            error = %e,
                            "Fallback model also failed"
                        );
                        continue;
                    }
                }
            }

            Err(last_err
                .unwrap_or_else(|| SextantError::transport(&config.model_id, "All providers failed")))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sextant_test_utils::MockLlm;

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            initial_backoff_ms: 10,
            max_backoff_ms: 20,
        }
    }

    #[test]
    fn test_retryable_classification() {
        assert!(is_retryable(&SextantError::transport("m", "HTTP 429 Too Many Requests: slow down")));
        assert!(is_retryable(&SextantError::transport("m", "HTTP 503 Service Unavailable: x")));
        assert!(is_retryable(&SextantError::Timeout {
            target: "m".into(),
            timeout_ms: 10
        }));
        assert!(!is_retryable(&SextantError::transport("m", "HTTP 401 Unauthorized: bad key")));
        assert!(!is_retryable(&SextantError::malformed("m", "not json")));
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig {
            max_retries: 10,
            initial_backoff_ms: 1000,
            max_backoff_ms: 5000,
        };
        let d = calculate_backoff(8, &config);
        assert!(d <= Duration::from_millis(6000));
        assert!(d >= Duration::from_millis(4000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_failure() {
        let mock = MockLlm::new();
        mock.push_err(SextantError::transport("m", "HTTP 503 Service Unavailable: busy"));
        mock.push_ok("recovered");

        let client = RetryingClient::new(Box::new(mock.clone()), vec![], fast_retry());
        let out = client
            .complete(&ModelConfig::new("m"), CompletionRequest::new("p"))
            .await
            .unwrap();
        assert_eq!(out, "recovered");
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_falls_back_after_exhaustion() {
        let primary = MockLlm::new();
        for _ in 0..3 {
            primary.push_err(SextantError::transport("m", "connection refused"));
        }
        let fallback = MockLlm::with_default("from fallback");

        let client = RetryingClient::new(
            Box::new(primary.clone()),
            vec![(ModelConfig::new("fb"), Box::new(fallback.clone()) as Box<dyn LlmClient>)],
            fast_retry(),
        );
        let out = client
            .complete(&ModelConfig::new("m"), CompletionRequest::new("p"))
            .await
            .unwrap();
        assert_eq!(out, "from fallback");
        assert_eq!(primary.call_count(), 3);
        assert_eq!(fallback.call_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_is_not_retried_or_routed_to_fallback() {
        let primary = MockLlm::new();
        primary.push_err(SextantError::malformed("m", "truncated"));
        let fallback = MockLlm::with_default("unused");

        let client = RetryingClient::new(
            Box::new(primary.clone()),
            vec![(ModelConfig::new("fb"), Box::new(fallback.clone()) as Box<dyn LlmClient>)],
            fast_retry(),
        );
        let err = client
            .complete(&ModelConfig::new("m"), CompletionRequest::new("p"))
            .await
            .unwrap_err();
        assert!(matches!(err, SextantError::MalformedResponse { .. }));
        assert_eq!(primary.call_count(), 1);
        assert_eq!(fallback.call_count(), 0);
    }
}
