use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::json;

use sextant_core::config::SerperConfig;
use sextant_core::error::{Result, SextantError};
use sextant_core::traits::SourceAdapter;
use sextant_core::types::{QueryParams, SourceItem, SourcePayload};

use super::{array, query_text, send_json, str_field};

const SERPER_API_URL: &str = "https://google.serper.dev";

/// Which Serper endpoint an adapter queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerperKind {
    Search,
    News,
}

impl SerperKind {
    fn endpoint(self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::News => "news",
        }
    }

    fn results_key(self) -> &'static str {
        match self {
            Self::Search => "organic",
            Self::News => "news",
        }
    }
}

/// Google web and news search through Serper.
///
/// Params: `q` (required), `n` result count.
pub struct SerperSource {
    kind: SerperKind,
    api_key: Option<String>,
    results: u32,
    country: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl SerperSource {
    pub fn new(kind: SerperKind, config: Option<&SerperConfig>, timeout: Duration) -> Self {
        Self {
            kind,
            api_key: config.map(|c| c.api_key.clone()).filter(|k| !k.is_empty()),
            results: config.map(|c| c.results).unwrap_or(10),
            country: config
                .map(|c| c.country.clone())
                .unwrap_or_else(|| "us".to_string()),
            timeout,
            http: reqwest::Client::new(),
        }
    }
}

pub(crate) fn parse_results(
    source: &str,
    kind: SerperKind,
    body: &serde_json::Value,
) -> Result<SourcePayload> {
    let items = array(source, body, kind.results_key())?
        .iter()
        .map(|r| {
            let mut item = SourceItem::new(str_field(r, "title"), str_field(r, "snippet"));
            let link = str_field(r, "link");
            if !link.is_empty() {
                item = item.with_url(link);
            }
            item.metadata = match kind {
                SerperKind::Search => json!({
                    "position": r["position"],
                    "source": r["displayLink"],
                }),
                SerperKind::News => json!({
                    "date": r["date"],
                    "source": r["source"],
                }),
            };
            item
        })
        .filter(|i| !i.title.is_empty())
        .collect();
    Ok(SourcePayload::new(items))
}

impl SourceAdapter for SerperSource {
    fn name(&self) -> &str {
        match self.kind {
            SerperKind::Search => "web_search",
            SerperKind::News => "news_search",
        }
    }

    fn source_type(&self) -> &str {
        "serper"
    }

    fn fetch(&self, params: &QueryParams) -> BoxFuture<'_, Result<SourcePayload>> {
        let params = params.clone();
        Box::pin(async move {
            let name = self.name();
            let api_key = self.api_key.as_deref().ok_or_else(|| {
                SextantError::Config(format!("{}: sources.serper.api_key is not set", name))
            })?;
            let query = query_text(name, &params)?;
            let num = params.get_u64("n").unwrap_or(self.results as u64);

            let request = self
                .http
                .post(format!("{}/{}", SERPER_API_URL, self.kind.endpoint()))
                .header("X-API-KEY", api_key)
                .json(&json!({
                    "q": query,
                    "num": num,
                    "gl": self.country,
                    "hl": "en",
                }));

            let body = send_json(name, request, self.timeout).await?;
            parse_results(name, self.kind, &body)
        })
    }
}
