use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use coordination::normalize::string_field;
use coordination::state::{Competitor, CompetitorAnalysis, MarketSaturation};
use coordination::{
    EngineConfig, ReasoningClient, Stage, StageError, StageId, StateDelta, StateSnapshot,
    StateValue,
};

use super::{format_market_research, format_search_results, require_idea, text_list};
use crate::prompts::COMPETITOR_ANALYST_PREAMBLE;
use crate::structured::{complete_json, CompetitorAnalysisReply};
use crate::tools::{
    competitor_queries, search_all, PageScraper, ScrapedPage, SearchProvider, SearchResult,
};

const PER_QUERY: usize = 5;

/// Aggregators and social sites that are never a competitor's own page.
const SKIP_DOMAINS: &[&str] = &[
    "wikipedia.org",
    "linkedin.com",
    "twitter.com",
    "facebook.com",
    "youtube.com",
    "reddit.com",
    "medium.com",
    "forbes.com",
    "techcrunch.com",
    "crunchbase.com",
    "g2.com",
    "capterra.com",
];

pub struct CompetitorAnalyst {
    client: Arc<dyn ReasoningClient>,
    search: Arc<dyn SearchProvider>,
    scraper: Arc<dyn PageScraper>,
}

impl CompetitorAnalyst {
    pub fn new(
        client: Arc<dyn ReasoningClient>,
        search: Arc<dyn SearchProvider>,
        scraper: Arc<dyn PageScraper>,
    ) -> Self {
        Self {
            client,
            search,
            scraper,
        }
    }

    /// Scrape candidate pages concurrently; failures are dropped.
    async fn scrape_pages(&self, urls: Vec<String>, config: &EngineConfig) -> Vec<ScrapedPage> {
        let timeout = config.scrape_timeout();
        let mut set = JoinSet::new();
        for (idx, url) in urls.into_iter().enumerate() {
            let scraper = self.scraper.clone();
            set.spawn(async move {
                let result = scraper.scrape(&url, timeout).await;
                (idx, result, url)
            });
        }

        let mut pages = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, Ok(page), _)) if !page.text.is_empty() => pages.push((idx, page)),
                Ok((_, Ok(_), url)) => debug!(url = %url, "Scraped page had no readable text"),
                Ok((_, Err(e), url)) => warn!(url = %url, error = %e, "Scrape failed, skipping"),
                Err(e) => warn!(error = %e, "Scrape task aborted"),
            }
        }
        pages.sort_by_key(|(idx, _)| *idx);
        pages.into_iter().map(|(_, page)| page).collect()
    }
}

/// URLs worth scraping, in result order, at most `limit`.
pub fn scrape_candidates(results: &[SearchResult], limit: usize) -> Vec<String> {
    results
        .iter()
        .map(|r| r.url.as_str())
        .filter(|url| !SKIP_DOMAINS.iter().any(|d| url.contains(d)))
        .take(limit)
        .map(str::to_string)
        .collect()
}

pub fn competitor_analysis_from_reply(reply: &serde_json::Value) -> CompetitorAnalysis {
    let competitors = reply
        .get("competitors")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    Some(Competitor {
                        name: string_field(item, "name")?,
                        url: string_field(item, "url"),
                        description: string_field(item, "description").unwrap_or_default(),
                        strengths: text_list(item, "strengths"),
                        weaknesses: text_list(item, "weaknesses"),
                        funding: string_field(item, "funding"),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    CompetitorAnalysis {
        competitors,
        market_saturation: MarketSaturation::normalize(
            reply.get("market_saturation").and_then(|v| v.as_str()),
        ),
        differentiation_opportunities: text_list(reply, "differentiation_opportunities"),
        barriers_to_entry: text_list(reply, "barriers_to_entry"),
        summary: string_field(reply, "summary").unwrap_or_default(),
    }
}

fn format_pages(pages: &[ScrapedPage]) -> String {
    if pages.is_empty() {
        return "(Unable to scrape competitor websites - using search results only)".to_string();
    }
    pages
        .iter()
        .map(|p| format!("---\n**{}** ({})\n{}", p.title, p.url, p.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl Stage for CompetitorAnalyst {
    async fn execute(
        &self,
        input: &StateSnapshot,
        config: &EngineConfig,
    ) -> Result<StateDelta, StageError> {
        let idea = require_idea(StageId::CompetitorAnalysis, input)?;

        let results = match search_all(
            &self.search,
            &competitor_queries(&idea),
            PER_QUERY,
            config.search_num_results,
        )
        .await
        {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, "Competitor search unavailable, continuing without results");
                Vec::new()
            }
        };
        let pages = self
            .scrape_pages(
                scrape_candidates(&results, config.max_competitors_to_scrape),
                config,
            )
            .await;

        let prompt = format!(
            "Analyze the competitive landscape for the following startup idea:\n\n\
             **Idea:** {idea}\n\n\
             **Market Context:**\n{}\n\n\
             **Search Results for Competitors:**\n{}\n\n\
             **Scraped Competitor Website Content:**\n{}\n\n\
             Provide a competitive analysis including:\n\
             1. A profile of each major competitor (3-5 if identifiable)\n\
             2. The market saturation level\n\
             3. Differentiation opportunities for a new entrant\n\
             4. Key barriers to entry\n\n\
             Be specific about each competitor's offering, audience and exploitable weaknesses.",
            format_market_research(input.market_research()),
            format_search_results(&results),
            format_pages(&pages)
        );

        let reply = complete_json::<CompetitorAnalysisReply>(
            self.client.as_ref(),
            COMPETITOR_ANALYST_PREAMBLE,
            &prompt,
            config.agent_timeout(),
        )
        .await?;
        let analysis = competitor_analysis_from_reply(&reply);
        info!(
            competitors = analysis.competitors.len(),
            scraped = pages.len(),
            saturation = %analysis.market_saturation,
            "Competitor analysis complete"
        );
        Ok(StateDelta::new().set(StateValue::CompetitorAnalysis(analysis)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hit(url: &str) -> SearchResult {
        SearchResult {
            title: url.into(),
            url: url.into(),
            snippet: String::new(),
        }
    }

    #[test]
    fn test_scrape_candidates_skips_aggregators_and_caps() {
        let results = vec![
            hit("https://en.wikipedia.org/wiki/Plant"),
            hit("https://bloomscape.com"),
            hit("https://www.crunchbase.com/org/x"),
            hit("https://thesill.com"),
            hit("https://plantbox.io"),
        ];
        assert_eq!(
            scrape_candidates(&results, 2),
            vec!["https://bloomscape.com", "https://thesill.com"]
        );
    }

    #[test]
    fn test_reply_drops_nameless_competitors() {
        let reply = json!({
            "competitors": [
                {"name": "The Sill", "description": "Plant delivery", "strengths": "brand"},
                {"description": "anonymous"},
                "not an object"
            ],
            "market_saturation": "Highly crowded",
            "barriers_to_entry": ["logistics"]
        });
        let a = competitor_analysis_from_reply(&reply);
        assert_eq!(a.competitors.len(), 1);
        assert_eq!(a.competitors[0].strengths, vec!["brand"]);
        assert_eq!(a.market_saturation, MarketSaturation::High);
        assert_eq!(a.barriers_to_entry, vec!["logistics"]);
    }
}
