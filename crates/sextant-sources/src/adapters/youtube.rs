use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::json;

use sextant_core::config::YoutubeConfig;
use sextant_core::error::{Result, SextantError};
use sextant_core::traits::SourceAdapter;
use sextant_core::types::{QueryParams, SourceItem, SourcePayload};

use super::{array, query_text, send_json, str_field};

const YOUTUBE_SEARCH_URL: &str = "https://www.googleapis.com/youtube/v3/search";

/// Video search on the YouTube Data API.
///
/// Params: `q` (required), `n` max results.
pub struct YoutubeSource {
    api_key: Option<String>,
    max_results: u32,
    timeout: Duration,
    http: reqwest::Client,
}

impl YoutubeSource {
    pub fn new(config: Option<&YoutubeConfig>, timeout: Duration) -> Self {
        Self {
            api_key: config.map(|c| c.api_key.clone()).filter(|k| !k.is_empty()),
            max_results: config.map(|c| c.max_results).unwrap_or(25),
            timeout,
            http: reqwest::Client::new(),
        }
    }
}

pub(crate) fn parse_videos(body: &serde_json::Value) -> Result<SourcePayload> {
    let items = array("youtube", body, "items")?
        .iter()
        .filter_map(|v| {
            let id = v["id"]["videoId"].as_str()?;
            let snippet = &v["snippet"];
            let mut item = SourceItem::new(str_field(snippet, "title"), str_field(snippet, "description"))
                .with_url(format!("https://www.youtube.com/watch?v={}", id));
            item.metadata = json!({
                "channel": snippet["channelTitle"],
                "published_at": snippet["publishedAt"],
            });
            Some(item)
        })
        .collect();
    Ok(SourcePayload::new(items))
}

impl SourceAdapter for YoutubeSource {
    fn name(&self) -> &str {
        "youtube"
    }

    fn fetch(&self, params: &QueryParams) -> BoxFuture<'_, Result<SourcePayload>> {
        let params = params.clone();
        Box::pin(async move {
            let api_key = self.api_key.as_deref().ok_or_else(|| {
                SextantError::Config("youtube: sources.youtube.api_key is not set".into())
            })?;
            let query = query_text(self.name(), &params)?;
            let max = params.get_u64("n").unwrap_or(self.max_results as u64).min(50);

            let request = self.http.get(YOUTUBE_SEARCH_URL).query(&[
                ("part", "snippet".to_string()),
                ("type", "video".to_string()),
                ("order", "relevance".to_string()),
                ("q", query.to_string()),
                ("maxResults", max.to_string()),
                ("key", api_key.to_string()),
            ]);

            let body = send_json(self.name(), request, self.timeout).await?;
            parse_videos(&body)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_videos_skips_non_video_ids() {
        let body = json!({
            "items": [
                {"id": {"kind": "youtube#video", "videoId": "abc123"}, "snippet": {"title": "Rust in 100 seconds", "description": "Intro", "channelTitle": "Fireship"}},
                {"id": {"kind": "youtube#channel", "channelId": "c1"}, "snippet": {"title": "A channel"}}
            ]
        });
        let payload = parse_videos(&body).unwrap();
        assert_eq!(payload.len(), 1);
        assert_eq!(payload.items[0].url.as_deref(), Some("https://www.youtube.com/watch?v=abc123"));
        assert_eq!(payload.items[0].metadata["channel"], "Fireship");
    }
}
