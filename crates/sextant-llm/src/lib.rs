pub mod providers;
pub mod retry;
pub mod structured;

use sextant_core::config::AppConfig;
use sextant_core::traits::LlmClient;

pub use providers::openai::OpenAiClient;
pub use retry::RetryingClient;
pub use structured::{extract_json, StructuredRetryPolicy};

/// Build the generative backend for a configuration: the primary model with
/// transport retries, falling back to each configured fallback model in turn.
///
/// Every supported provider speaks the OpenAI chat-completions protocol; the
/// provider name only selects a default endpoint (see [`providers::presets`]).
pub fn create_client(config: &AppConfig) -> Box<dyn LlmClient> {
    let fallbacks = config
        .fallback_models
        .iter()
        .map(|fb| (fb.clone(), Box::new(OpenAiClient::new()) as Box<dyn LlmClient>))
        .collect();

    Box::new(RetryingClient::new(
        Box::new(OpenAiClient::new()),
        fallbacks,
        config.model.retry.clone().unwrap_or_default(),
    ))
}
