use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use sextant_core::config::ModelConfig;
use sextant_core::error::{Result, SextantError};
use sextant_core::traits::LlmClient;
use sextant_core::types::CompletionRequest;

use super::presets;

/// OpenAI-compatible client. Works with OpenAI, Ollama, vLLM, Groq, OpenRouter, etc.
pub struct OpenAiClient {
    http: Client,
}

impl OpenAiClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }
}

impl Default for OpenAiClient {
    fn default() -> Self {
        Self::new()
    }
}

// Request types
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct OaiMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    r#type: &'static str,
}

// Response types
#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn build_request(config: &ModelConfig, request: CompletionRequest) -> ChatRequest {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = request.system {
        messages.push(OaiMessage {
            role: "system",
            content: system,
        });
    }
    messages.push(OaiMessage {
        role: "user",
        content: request.prompt,
    });

    // o-series models reject temperature
    let is_o_series = config.model_id.starts_with("o1")
        || config.model_id.starts_with("o3")
        || config.model_id.starts_with("o4");
    let temperature = request.temperature.unwrap_or(config.temperature);

    ChatRequest {
        model: config.model_id.clone(),
        messages,
        max_tokens: request.max_tokens.unwrap_or(config.max_tokens),
        temperature: if is_o_series { None } else { Some(temperature) },
        response_format: request.json.then_some(ResponseFormat {
            r#type: "json_object",
        }),
    }
}

/// Extract the completion text from a chat-completions response body.
pub(crate) fn parse_completion(target: &str, body: &str) -> Result<String> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| SextantError::malformed(target, e))?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| SextantError::malformed(target, "response has no completion text"))
}

impl LlmClient for OpenAiClient {
    fn complete(
        &self,
        config: &ModelConfig,
        request: CompletionRequest,
    ) -> BoxFuture<'_, Result<String>> {
        let config = config.clone();

        Box::pin(async move {
            let target = config.model_id.clone();
            let url = presets::chat_completions_url(&config.provider, config.base_url.as_deref())
                .ok_or_else(|| {
                    SextantError::Config(format!(
                        "provider '{}' has no default endpoint; set model.base_url",
                        config.provider
                    ))
                })?;
            let timeout = Duration::from_secs(config.request_timeout_secs);
            let body = build_request(&config, request);

            let mut req = self.http.post(&url).timeout(timeout).json(&body);
            if let Some(api_key) = &config.api_key {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }

            debug!(model = %config.model_id, url = %url, "Sending completion request");
            let response = req.send().await.map_err(|e| {
                if e.is_timeout() {
                    SextantError::Timeout {
                        target: target.clone(),
                        timeout_ms: timeout.as_millis() as u64,
                    }
                } else {
                    SextantError::transport(&target, e)
                }
            })?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown".to_string());
                return Err(SextantError::transport(
                    &target,
                    format!("HTTP {}: {}", status, body),
                ));
            }

            let text = response
                .text()
                .await
                .map_err(|e| SextantError::transport(&target, e))?;
            parse_completion(&target, &text)
        })
    }
}
