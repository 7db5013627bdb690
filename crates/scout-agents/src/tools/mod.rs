//! Web tools used by the research and competitor stages.
//!
//! Both tools sit behind traits so stages can be exercised with canned
//! results. Neither goes through the rate governor; only reasoning-service
//! calls are paced.

pub mod scrape;
pub mod search;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::warn;

pub use scrape::{html_to_text, HttpScraper, ScrapedPage};
pub use search::{
    competitor_queries, dedup_by_url, market_queries, parse_results, DuckDuckGoSearch,
    SearchResult,
};

/// Errors that can occur during tool execution.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("request to {url} timed out after {seconds}s")]
    Timeout { url: String, seconds: u64 },

    #[error("invalid url `{0}`")]
    InvalidUrl(String),
}

impl ToolError {
    pub(crate) fn from_reqwest(url: &str, timeout: Duration, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
                seconds: timeout.as_secs(),
            }
        } else {
            Self::Request {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// Web search.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, max_results: usize)
        -> Result<Vec<SearchResult>, ToolError>;
}

/// Page fetch reduced to readable text.
#[async_trait]
pub trait PageScraper: Send + Sync {
    async fn scrape(&self, url: &str, timeout: Duration) -> Result<ScrapedPage, ToolError>;
}

/// Run every query concurrently, keep the first hit per URL in query order
/// and stop at `limit` results.
///
/// Failed queries are skipped; an error is returned only when all of them fail.
pub async fn search_all(
    provider: &Arc<dyn SearchProvider>,
    queries: &[String],
    per_query: usize,
    limit: usize,
) -> Result<Vec<SearchResult>, ToolError> {
    let mut set = JoinSet::new();
    for (idx, query) in queries.iter().cloned().enumerate() {
        let provider = Arc::clone(provider);
        set.spawn(async move {
            let result = provider.search(&query, per_query).await;
            (idx, query, result)
        });
    }

    let mut batches = Vec::new();
    let mut last_err = None;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, _, Ok(results))) => batches.push((idx, results)),
            Ok((_, query, Err(e))) => {
                warn!(query = %query, error = %e, "Search query failed");
                last_err = Some(e);
            }
            Err(e) => warn!(error = %e, "Search task aborted"),
        }
    }

    if batches.is_empty() {
        if let Some(e) = last_err {
            return Err(e);
        }
    }
    batches.sort_by_key(|(idx, _)| *idx);
    let mut unique = dedup_by_url(batches.into_iter().flat_map(|(_, r)| r).collect());
    unique.truncate(limit);
    Ok(unique)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        calls: AtomicU32,
        fail_all: bool,
    }

    #[async_trait]
    impl SearchProvider for Flaky {
        async fn search(
            &self,
            query: &str,
            _max_results: usize,
        ) -> Result<Vec<SearchResult>, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_all || query == "bad" {
                return Err(ToolError::InvalidUrl(query.to_string()));
            }
            Ok(vec![
                SearchResult {
                    title: query.to_string(),
                    url: format!("https://{query}.test"),
                    snippet: String::new(),
                },
                SearchResult {
                    title: "shared".into(),
                    url: "https://shared.test".into(),
                    snippet: String::new(),
                },
            ])
        }
    }

    fn queries(items: &[&str]) -> Vec<String> {
        items.iter().map(|q| q.to_string()).collect()
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_order_and_dedups() {
        let provider: Arc<dyn SearchProvider> = Arc::new(Flaky {
            calls: AtomicU32::new(0),
            fail_all: false,
        });
        let results = search_all(&provider, &queries(&["alpha", "bad", "beta"]), 5, 10)
            .await
            .unwrap();
        let urls: Vec<&str> = results.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://alpha.test", "https://shared.test", "https://beta.test"]
        );
    }

    #[tokio::test]
    async fn test_all_failed_is_an_error() {
        let provider: Arc<dyn SearchProvider> = Arc::new(Flaky {
            calls: AtomicU32::new(0),
            fail_all: true,
        });
        assert!(search_all(&provider, &queries(&["a", "b"]), 5, 10)
            .await
            .is_err());
    }
}
