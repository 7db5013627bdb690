//! Concrete stage functions backed by the reasoning service.
//!
//! | Stage | Type | Service calls |
//! |-------|------|---------------|
//! | validate_input | [`InputValidator`] | 0 or 1 |
//! | market_research | [`MarketResearcher`] | 1 |
//! | competitor_analysis | [`CompetitorAnalyst`] | 1 |
//! | critique | [`Critic`] | 1 |
//! | debate | `DebateStage` over [`DebatePanel`] | turns + 1 |
//! | write_report | [`ReportWriter`] | 1 |

pub mod competitors;
pub mod critic;
pub mod panel;
pub mod researcher;
pub mod validator;
pub mod writer;

use std::sync::Arc;

use coordination::state::{CompetitorAnalysis, MarketResearch};
use coordination::{
    DebateStage, EngineConfig, ReasoningClient, StageError, StageId, StageRegistry, StateKey,
    StateSnapshot,
};

use crate::tools::{PageScraper, SearchProvider, SearchResult};

pub use competitors::CompetitorAnalyst;
pub use critic::Critic;
pub use panel::{parse_synthesis, DebatePanel};
pub use researcher::MarketResearcher;
pub use validator::InputValidator;
pub use writer::ReportWriter;

/// External handles shared by every stage.
#[derive(Clone)]
pub struct AgentDeps {
    pub client: Arc<dyn ReasoningClient>,
    pub search: Arc<dyn SearchProvider>,
    pub scraper: Arc<dyn PageScraper>,
}

/// Register every stage both control modes can route to.
pub fn build_registry(deps: &AgentDeps, config: &EngineConfig) -> StageRegistry {
    let panel = DebatePanel::new(deps.client.clone(), config.agent_timeout());
    StageRegistry::new()
        .with(
            StageId::ValidateInput,
            Arc::new(InputValidator::new(deps.client.clone())),
        )
        .with(
            StageId::MarketResearch,
            Arc::new(MarketResearcher::new(deps.client.clone(), deps.search.clone())),
        )
        .with(
            StageId::CompetitorAnalysis,
            Arc::new(CompetitorAnalyst::new(
                deps.client.clone(),
                deps.search.clone(),
                deps.scraper.clone(),
            )),
        )
        .with(StageId::Critique, Arc::new(Critic::new(deps.client.clone())))
        .with(StageId::Debate, Arc::new(DebateStage::new(Arc::new(panel))))
        .with(
            StageId::WriteReport,
            Arc::new(ReportWriter::new(deps.client.clone())),
        )
}

pub(crate) fn require_idea(stage: StageId, state: &StateSnapshot) -> Result<String, StageError> {
    state
        .idea()
        .map(str::to_string)
        .ok_or(StageError::MissingInput {
            stage,
            key: StateKey::Idea,
        })
}

/// The idea as first submitted, recovered from the pivot history.
pub(crate) fn original_idea(state: &StateSnapshot) -> Option<&str> {
    state
        .pivot_history()
        .first()
        .map(|p| p.prior_idea.as_str())
        .or_else(|| state.idea())
}

/// Read a list that the model may have sent as a single string.
pub(crate) fn text_list(value: &serde_json::Value, key: &str) -> Vec<String> {
    match value.get(key) {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => coordination::normalize::string_list(value, key),
    }
}

pub(crate) fn format_search_results(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "(No search results available)".to_string();
    }
    results
        .iter()
        .map(|r| format!("**{}**\nURL: {}\n{}", r.title, r.url, r.snippet))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub(crate) fn format_market_research(research: Option<&MarketResearch>) -> String {
    let Some(r) = research else {
        return "(No market research available)".to_string();
    };
    format!(
        "- Market Size: {}\n- Growth Rate: {}\n- Market Maturity: {}\n- Key Trends: {}\n\
         - Target Demographics: {}\n\nSummary: {}",
        r.market_size_estimate,
        r.growth_rate,
        r.market_maturity,
        r.key_trends.join(", "),
        r.target_demographics.join(", "),
        r.summary
    )
}

pub(crate) fn format_competitor_analysis(analysis: Option<&CompetitorAnalysis>) -> String {
    let Some(a) = analysis else {
        return "(No competitor analysis available)".to_string();
    };
    let competitors: String = a
        .competitors
        .iter()
        .take(5)
        .map(|c| {
            format!(
                "\n  - **{}**: {}\n    Strengths: {}\n    Weaknesses: {}",
                c.name,
                c.description,
                c.strengths.iter().take(3).cloned().collect::<Vec<_>>().join(", "),
                c.weaknesses.iter().take(2).cloned().collect::<Vec<_>>().join(", ")
            )
        })
        .collect();
    format!(
        "- Market Saturation: {}\n- Barriers to Entry: {}\n- Differentiation Opportunities: {}\n\n\
         Competitors:{}\n\nSummary: {}",
        a.market_saturation,
        a.barriers_to_entry.join(", "),
        a.differentiation_opportunities.join(", "),
        if competitors.is_empty() {
            " none identified".to_string()
        } else {
            competitors
        },
        a.summary
    )
}
