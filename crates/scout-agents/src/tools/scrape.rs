//! Fetch a page and keep the readable parts.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use super::{PageScraper, ToolError};

/// Characters of page text kept per competitor page.
pub const MAX_PAGE_CHARS: usize = 2000;

static TITLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("TITLE_SEL selector should parse"));
static CONTENT_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("h1, h2, h3, p, li").expect("CONTENT_SEL selector should parse")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedPage {
    pub url: String,
    pub title: String,
    /// Markdown-ish text: headings prefixed with `#`, list items with `-`.
    pub text: String,
}

pub struct HttpScraper {
    http: reqwest::Client,
    max_chars: usize,
}

impl Default for HttpScraper {
    fn default() -> Self {
        Self::new(MAX_PAGE_CHARS)
    }
}

impl HttpScraper {
    pub fn new(max_chars: usize) -> Self {
        Self {
            http: reqwest::Client::new(),
            max_chars,
        }
    }
}

#[async_trait]
impl PageScraper for HttpScraper {
    async fn scrape(&self, url: &str, timeout: Duration) -> Result<ScrapedPage, ToolError> {
        let parsed = Url::parse(url).map_err(|_| ToolError::InvalidUrl(url.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ToolError::InvalidUrl(url.to_string()));
        }
        let response = self
            .http
            .get(parsed)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ToolError::from_reqwest(url, timeout, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let html = response
            .text()
            .await
            .map_err(|e| ToolError::from_reqwest(url, timeout, e))?;
        let (title, text) = html_to_text(&html, self.max_chars);
        Ok(ScrapedPage {
            url: url.to_string(),
            title,
            text,
        })
    }
}

/// Reduce an HTML document to `(title, text)`, text truncated to `max_chars`.
pub fn html_to_text(html: &str, max_chars: usize) -> (String, String) {
    let document = Html::parse_document(html);
    let title = document
        .select(&TITLE_SEL)
        .next()
        .map(element_text)
        .unwrap_or_default();

    let mut lines = Vec::new();
    for element in document.select(&CONTENT_SEL) {
        let text = element_text(element);
        if text.is_empty() {
            continue;
        }
        let line = match element.value().name() {
            "h1" => format!("# {text}"),
            "h2" => format!("## {text}"),
            "h3" => format!("### {text}"),
            "li" => format!("- {text}"),
            _ => text,
        };
        lines.push(line);
    }
    (title, truncate_chars(&lines.join("\n"), max_chars))
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
