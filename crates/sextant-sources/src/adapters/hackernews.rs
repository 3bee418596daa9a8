use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::json;

use sextant_core::config::HackerNewsConfig;
use sextant_core::error::Result;
use sextant_core::traits::SourceAdapter;
use sextant_core::types::{QueryParams, SourceItem, SourcePayload};

use super::{array, query_text, send_json, str_field};

const HN_SEARCH_URL: &str = "https://hn.algolia.com/api/v1/search";

/// Story search over Hacker News via Algolia. Also covers "Who is hiring"
/// threads when queried with `tags = "comment,story_<id>"`.
///
/// Params: `q` (required), `n` hits, `tags` (default `story`).
pub struct HackerNewsSource {
    hits_per_page: u32,
    timeout: Duration,
    http: reqwest::Client,
}

impl HackerNewsSource {
    pub fn new(config: &HackerNewsConfig, timeout: Duration) -> Self {
        Self {
            hits_per_page: config.hits_per_page,
            timeout,
            http: reqwest::Client::new(),
        }
    }
}

pub(crate) fn parse_hits(body: &serde_json::Value) -> Result<SourcePayload> {
    let items = array("hackernews", body, "hits")?
        .iter()
        .filter_map(|hit| {
            let title = hit["title"]
                .as_str()
                .or_else(|| hit["story_title"].as_str())?;
            let snippet = hit["story_text"]
                .as_str()
                .or_else(|| hit["comment_text"].as_str())
                .unwrap_or_default();
            let url = hit["url"].as_str().map(str::to_string).unwrap_or_else(|| {
                format!("https://news.ycombinator.com/item?id={}", str_field(hit, "objectID"))
            });

            let mut item = SourceItem::new(title, snippet).with_url(url);
            item.score = hit["points"].as_f64();
            item.metadata = json!({
                "comments": hit["num_comments"],
                "created_at": hit["created_at"],
            });
            Some(item)
        })
        .collect();
    Ok(SourcePayload::new(items))
}

impl SourceAdapter for HackerNewsSource {
    fn name(&self) -> &str {
        "hackernews"
    }

    fn fetch(&self, params: &QueryParams) -> BoxFuture<'_, Result<SourcePayload>> {
        let params = params.clone();
        Box::pin(async move {
            let query = query_text(self.name(), &params)?;
            let hits = params.get_u64("n").unwrap_or(self.hits_per_page as u64);
            let tags = params.get_str("tags").unwrap_or("story");

            let request = self.http.get(HN_SEARCH_URL).query(&[
                ("query", query.to_string()),
                ("tags", tags.to_string()),
                ("hitsPerPage", hits.to_string()),
            ]);

            let body = send_json(self.name(), request, self.timeout).await?;
            parse_hits(&body)
        })
    }
}
