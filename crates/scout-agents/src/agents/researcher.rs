use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use coordination::normalize::string_field;
use coordination::state::{MarketMaturity, MarketResearch};
use coordination::{
    EngineConfig, ReasoningClient, Stage, StageError, StageId, StateDelta, StateSnapshot,
    StateValue,
};

use super::{format_search_results, require_idea, text_list};
use crate::prompts::MARKET_RESEARCHER_PREAMBLE;
use crate::structured::{complete_json, MarketResearchReply};
use crate::tools::{market_queries, search_all, SearchProvider};

/// Results requested per individual query.
const PER_QUERY: usize = 5;

/// Market size, growth and trend analysis grounded in web search.
pub struct MarketResearcher {
    client: Arc<dyn ReasoningClient>,
    search: Arc<dyn SearchProvider>,
}

impl MarketResearcher {
    pub fn new(client: Arc<dyn ReasoningClient>, search: Arc<dyn SearchProvider>) -> Self {
        Self { client, search }
    }
}

/// Build the record from a lenient JSON reply.
pub fn market_research_from_reply(reply: &serde_json::Value) -> MarketResearch {
    let unknown = || "Unknown".to_string();
    MarketResearch {
        market_size_estimate: string_field(reply, "market_size_estimate").unwrap_or_else(unknown),
        growth_rate: string_field(reply, "growth_rate").unwrap_or_else(unknown),
        key_trends: text_list(reply, "key_trends"),
        target_demographics: text_list(reply, "target_demographics"),
        market_maturity: MarketMaturity::normalize(
            reply.get("market_maturity").and_then(|v| v.as_str()),
        ),
        data_sources: text_list(reply, "data_sources"),
        summary: string_field(reply, "summary").unwrap_or_default(),
    }
}

#[async_trait]
impl Stage for MarketResearcher {
    async fn execute(
        &self,
        input: &StateSnapshot,
        config: &EngineConfig,
    ) -> Result<StateDelta, StageError> {
        let idea = require_idea(StageId::MarketResearch, input)?;

        let results = match search_all(
            &self.search,
            &market_queries(&idea),
            PER_QUERY,
            config.search_num_results,
        )
        .await
        {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, "Market search unavailable, continuing without results");
                Vec::new()
            }
        };

        let prompt = format!(
            "Analyze the market opportunity for the following startup idea:\n\n\
             **Idea:** {idea}\n\n\
             **Search Results:**\n{}\n\n\
             Based on these search results and your knowledge, provide a market research analysis \
             covering:\n\
             1. Market size (TAM/SAM/SOM) with specific numbers where available\n\
             2. Growth rate and trajectory\n\
             3. Key market trends\n\
             4. Target demographics and customer segments\n\
             5. Market maturity stage\n\n\
             Cite sources where possible. If exact data isn't available, give reasonable estimates \
             with clear caveats.",
            format_search_results(&results)
        );

        let reply = complete_json::<MarketResearchReply>(
            self.client.as_ref(),
            MARKET_RESEARCHER_PREAMBLE,
            &prompt,
            config.agent_timeout(),
        )
        .await?;
        let research = market_research_from_reply(&reply);
        info!(
            sources = results.len(),
            maturity = %research.market_maturity,
            "Market research complete"
        );
        Ok(StateDelta::new().set(StateValue::MarketResearch(research)))
    }
}
