//! DuckDuckGo web search adapter
//!
//! Scrapes the HTML endpoint, which needs no API key. Requests are paced by
//! a process-wide rate limiter to stay well under the endpoint's tolerance.

use crate::error::{EngineError, Result};
use crate::providers::SearchProvider;
use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const SEARCH_URL: &str = "https://html.duckduckgo.com/html/";
const DEFAULT_RATE_LIMIT_PER_MINUTE: u32 = 20;

type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Search backed by the DuckDuckGo HTML endpoint
pub struct DuckDuckGoSearch {
    client: Client,
    rate_limiter: SharedRateLimiter,
}

impl DuckDuckGoSearch {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_rate_limit(timeout, DEFAULT_RATE_LIMIT_PER_MINUTE)
    }

    /// `rate_limit` is requests per minute; values of zero fall back to the
    /// default limit
    pub fn with_rate_limit(timeout: Duration, rate_limit: u32) -> Result<Self> {
        let per_minute = NonZeroU32::new(rate_limit)
            .or(NonZeroU32::new(DEFAULT_RATE_LIMIT_PER_MINUTE))
            .ok_or_else(|| EngineError::Config("invalid search rate limit".to_string()))?;
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(per_minute)));

        let client = Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) sleuth/0.1")
            .build()
            .map_err(EngineError::Network)?;

        Ok(Self {
            client,
            rate_limiter,
        })
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    async fn search(&self, query: &str) -> Result<String> {
        self.rate_limiter.until_ready().await;
        debug!(%query, "running web search");

        let response = self
            .client
            .get(SEARCH_URL)
            .query(&[("q", query)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EngineError::Provider(format!(
                "duckduckgo HTTP {}",
                response.status()
            )));
        }

        let html = response.text().await?;
        let text = strip_tags(&html);

        if text.trim().is_empty() {
            return Err(EngineError::Provider(
                "duckduckgo returned an empty result page".to_string(),
            ));
        }

        Ok(text)
    }
}

/// Reduce an HTML page to its visible text. Good enough for keyword
/// extraction; not a general-purpose HTML parser.
fn strip_tags(html: &str) -> String {
    fn starts_with_ci(rest: &str, needle: &str) -> bool {
        rest.len() >= needle.len() && rest.as_bytes()[..needle.len()].eq_ignore_ascii_case(needle.as_bytes())
    }

    let mut text = String::with_capacity(html.len() / 4);
    let mut in_tag = false;
    let mut skip_content = false;
    let mut rest = html;

    while let Some(ch) = rest.chars().next() {
        match ch {
            '<' => {
                in_tag = true;
                if starts_with_ci(rest, "<script") || starts_with_ci(rest, "<style") {
                    skip_content = true;
                } else if starts_with_ci(rest, "</script") || starts_with_ci(rest, "</style") {
                    skip_content = false;
                }
            }
            '>' => {
                in_tag = false;
                text.push(' ');
            }
            c if !in_tag && !skip_content => text.push(c),
            _ => {}
        }
        rest = &rest[ch.len_utf8()..];
    }

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_tags_extracts_visible_text() {
        let html = "<html><body><a class=\"result\">AAPL earnings beat</a>\
                    <p>analysts raised the price target</p></body></html>";
        let text = strip_tags(html);

        assert!(text.contains("AAPL earnings beat"));
        assert!(text.contains("price target"));
        assert!(!text.contains('<'));
    }

    #[test]
    fn test_strip_tags_drops_scripts() {
        let html = "<p>visible</p><script>var hidden = 1;</script><p>also visible</p>";
        let text = strip_tags(html);

        assert!(text.contains("visible"));
        assert!(text.contains("also visible"));
        assert!(!text.contains("hidden"));
    }

    #[tokio::test]
    #[ignore]
    async fn test_live_search() {
        let provider = DuckDuckGoSearch::new(Duration::from_secs(10)).unwrap();
        let text = provider.search("AAPL stock news").await.unwrap();
        assert!(!text.is_empty());
    }
}
