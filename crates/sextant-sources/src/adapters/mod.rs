pub mod github;
pub mod hackernews;
pub mod serper;
pub mod youtube;

use std::time::Duration;

use sextant_core::error::{Result, SextantError};
use sextant_core::types::QueryParams;

pub use github::GithubTrendsSource;
pub use hackernews::HackerNewsSource;
pub use serper::{SerperKind, SerperSource};
pub use youtube::YoutubeSource;

/// The search text every adapter expects under `q`.
pub(crate) fn query_text<'a>(source: &str, params: &'a QueryParams) -> Result<&'a str> {
    params
        .get_str("q")
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| SextantError::Config(format!("{}: query parameter 'q' is required", source)))
}

/// Send a request and decode the JSON body, mapping failures onto the
/// transport / malformed split callers rely on.
pub(crate) async fn send_json(
    source: &str,
    request: reqwest::RequestBuilder,
    timeout: Duration,
) -> Result<serde_json::Value> {
    let response = request.timeout(timeout).send().await.map_err(|e| {
        if e.is_timeout() {
            SextantError::Timeout {
                target: source.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }
        } else {
            SextantError::transport(source, e)
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown".to_string());
        return Err(SextantError::transport(
            source,
            format!("HTTP {}: {}", status, body),
        ));
    }

    let text = response
        .text()
        .await
        .map_err(|e| SextantError::transport(source, e))?;
    serde_json::from_str(&text).map_err(|e| SextantError::malformed(source, e))
}

/// The array under `key`, or a malformed error when the provider's shape changed.
pub(crate) fn array<'a>(
    source: &str,
    body: &'a serde_json::Value,
    key: &str,
) -> Result<&'a Vec<serde_json::Value>> {
    match body.get(key) {
        Some(serde_json::Value::Array(items)) => Ok(items),
        // Providers omit the key entirely when nothing matched
        None | Some(serde_json::Value::Null) => Ok(&EMPTY),
        Some(_) => Err(SextantError::malformed(
            source,
            format!("'{}' is not an array", key),
        )),
    }
}

static EMPTY: Vec<serde_json::Value> = Vec::new();

pub(crate) fn str_field(value: &serde_json::Value, key: &str) -> String {
    value[key].as_str().unwrap_or_default().to_string()
}
