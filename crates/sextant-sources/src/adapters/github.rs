use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::json;

use sextant_core::config::GithubConfig;
use sextant_core::error::Result;
use sextant_core::traits::SourceAdapter;
use sextant_core::types::{QueryParams, SourceItem, SourcePayload};

use super::{array, query_text, send_json, str_field};

const GITHUB_SEARCH_URL: &str = "https://api.github.com/search/repositories";

/// Repository search on GitHub, sorted by stars.
///
/// Params: `q` (required, GitHub search syntax), `n` per page,
/// `sort` (`stars` | `forks` | `updated`).
pub struct GithubTrendsSource {
    token: Option<String>,
    per_page: u32,
    timeout: Duration,
    http: reqwest::Client,
}

impl GithubTrendsSource {
    pub fn new(config: Option<&GithubConfig>, timeout: Duration) -> Self {
        Self {
            token: config.and_then(|c| c.token.clone()).filter(|t| !t.is_empty()),
            per_page: config.map(|c| c.per_page).unwrap_or(30),
            timeout,
            http: reqwest::Client::new(),
        }
    }
}

pub(crate) fn parse_repositories(body: &serde_json::Value) -> Result<SourcePayload> {
    let items = array("github_trends", body, "items")?
        .iter()
        .map(|repo| {
            let mut item = SourceItem::new(str_field(repo, "full_name"), str_field(repo, "description"))
                .with_url(str_field(repo, "html_url"));
            item.score = repo["stargazers_count"].as_f64();
            item.metadata = json!({
                "language": repo["language"],
                "topics": repo["topics"],
                "forks": repo["forks_count"],
                "created_at": repo["created_at"],
            });
            item
        })
        .collect();
    Ok(SourcePayload::new(items))
}

impl SourceAdapter for GithubTrendsSource {
    fn name(&self) -> &str {
        "github_trends"
    }

    fn source_type(&self) -> &str {
        "github"
    }

    fn fetch(&self, params: &QueryParams) -> BoxFuture<'_, Result<SourcePayload>> {
        let params = params.clone();
        Box::pin(async move {
            let query = query_text(self.name(), &params)?;
            let per_page = params.get_u64("n").unwrap_or(self.per_page as u64).min(100);
            let sort = params.get_str("sort").unwrap_or("stars");

            let mut request = self
                .http
                .get(GITHUB_SEARCH_URL)
                .header("User-Agent", "sextant")
                .header("Accept", "application/vnd.github+json")
                .query(&[
                    ("q", query.to_string()),
                    ("sort", sort.to_string()),
                    ("order", "desc".to_string()),
                    ("per_page", per_page.to_string()),
                ]);
            // Unauthenticated search works, with a much lower rate limit
            if let Some(token) = &self.token {
                request = request.header("Authorization", format!("Bearer {}", token));
            }

            let body = send_json(self.name(), request, self.timeout).await?;
            parse_repositories(&body)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repositories() {
        let body = json!({
            "total_count": 2,
            "items": [
                {"full_name": "tokio-rs/tokio", "html_url": "https://github.com/tokio-rs/tokio", "description": "Async runtime", "stargazers_count": 27000, "language": "Rust", "topics": ["async"], "forks_count": 2400},
                {"full_name": "a/b", "html_url": "https://github.com/a/b", "description": null, "stargazers_count": 51}
            ]
        });
        let payload = parse_repositories(&body).unwrap();
        assert_eq!(payload.len(), 2);
        assert_eq!(payload.items[0].score, Some(27000.0));
        assert_eq!(payload.items[0].metadata["language"], "Rust");
        assert_eq!(payload.items[1].snippet, "");
    }

    #[test]
    fn test_empty_search() {
        let payload = parse_repositories(&json!({"total_count": 0, "items": []})).unwrap();
        assert!(payload.is_empty());
    }
}
