//! DuckDuckGo HTML search.

use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{SearchProvider, ToolError};

const ENDPOINT: &str = "https://html.duckduckgo.com/html/";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) vc-scout/0.1";

static RESULT_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".result").expect("RESULT_SEL selector should parse"));
static TITLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.result__a").expect("TITLE_SEL selector should parse"));
static SNIPPET_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".result__snippet").expect("SNIPPET_SEL selector should parse")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

pub struct DuckDuckGoSearch {
    http: reqwest::Client,
    timeout: Duration,
}

impl DuckDuckGoSearch {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, ToolError> {
        let response = self
            .http
            .get(ENDPOINT)
            .query(&[("q", query)])
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ToolError::from_reqwest(ENDPOINT, self.timeout, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Status {
                url: ENDPOINT.to_string(),
                status: status.as_u16(),
            });
        }
        let html = response
            .text()
            .await
            .map_err(|e| ToolError::from_reqwest(ENDPOINT, self.timeout, e))?;
        let results = parse_results(&html, max_results);
        debug!(query, count = results.len(), "Search completed");
        Ok(results)
    }
}

/// Parse a DuckDuckGo HTML results page.
pub fn parse_results(html: &str, max_results: usize) -> Vec<SearchResult> {
    let document = Html::parse_document(html);
    document
        .select(&RESULT_SEL)
        .filter_map(|result| {
            let anchor = result.select(&TITLE_SEL).next()?;
            let url = resolve_href(anchor.value().attr("href")?)?;
            let title = collapse(anchor.text());
            let snippet = result
                .select(&SNIPPET_SEL)
                .next()
                .map(|s| collapse(s.text()))
                .unwrap_or_default();
            Some(SearchResult {
                title,
                url,
                snippet,
            })
        })
        .take(max_results)
        .collect()
}

/// Unwrap DuckDuckGo's `/l/?uddg=` redirect links.
fn resolve_href(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else if href.starts_with('/') {
        format!("https://duckduckgo.com{href}")
    } else {
        href.to_string()
    };
    let url = Url::parse(&absolute).ok()?;
    if url.domain().is_some_and(|d| d.ends_with("duckduckgo.com")) {
        return url
            .query_pairs()
            .find(|(k, _)| k == "uddg")
            .map(|(_, v)| v.into_owned());
    }
    Some(url.to_string())
}

fn collapse<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Keep the first result per URL, preserving order.
pub fn dedup_by_url(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter(|r| seen.insert(r.url.clone()))
        .collect()
}

/// Market size, growth and demographic queries for an idea.
pub fn market_queries(idea: &str) -> Vec<String> {
    vec![
        format!("{idea} market size TAM"),
        format!("{idea} industry growth rate trends"),
        format!("{idea} target market demographics"),
    ]
}

pub fn competitor_queries(idea: &str) -> Vec<String> {
    vec![
        format!("{idea} competitors companies startups"),
        format!("best {idea} apps services"),
        format!("{idea} market leaders alternatives"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"
<html><body>
  <div class="result results_links">
    <h2 class="result__title">
      <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Fplants&amp;rut=abc">Plant <b>Subscriptions</b></a>
    </h2>
    <a class="result__snippet" href="#">The indoor   plant market is
      growing.</a>
  </div>
  <div class="result">
    <a class="result__a" href="https://other.example.org/report">Report</a>
  </div>
  <div class="result"><span>no anchor here</span></div>
</body></html>"##;

    #[test]
    fn test_parse_results_unwraps_redirects() {
        let results = parse_results(PAGE, 10);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].url, "https://example.com/plants");
        assert_eq!(results[0].title, "Plant Subscriptions");
        assert_eq!(results[0].snippet, "The indoor plant market is growing.");
        assert_eq!(results[1].url, "https://other.example.org/report");
        assert_eq!(results[1].snippet, "");
    }

    #[test]
    fn test_parse_results_respects_limit() {
        assert_eq!(parse_results(PAGE, 1).len(), 1);
        assert!(parse_results("<html></html>", 5).is_empty());
    }

    #[test]
    fn test_dedup_by_url_keeps_first() {
        let r = |t: &str, u: &str| SearchResult {
            title: t.into(),
            url: u.into(),
            snippet: String::new(),
        };
        let unique = dedup_by_url(vec![r("a", "u1"), r("b", "u2"), r("c", "u1")]);
        let titles: Vec<_> = unique.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b"]);
    }

    #[test]
    fn test_query_builders_mention_idea() {
        assert!(market_queries("pet tutoring")
            .iter()
            .all(|q| q.contains("pet tutoring")));
        assert_eq!(competitor_queries("x").len(), 3);
    }
}
