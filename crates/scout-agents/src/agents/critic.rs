//! Devil's-advocate critic for the legacy pivot loop.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use coordination::normalize::{normalize_critique_verdict, string_field};
use coordination::state::Critique;
use coordination::{
    EngineConfig, ReasoningClient, Score, Stage, StageError, StageId, StateDelta, StateSnapshot,
    StateValue,
};

use super::{
    format_competitor_analysis, format_market_research, original_idea, require_idea, text_list,
};
use crate::prompts::CRITIC_PREAMBLE;
use crate::structured::{complete_json, CritiqueReply};

pub struct Critic {
    client: Arc<dyn ReasoningClient>,
}

impl Critic {
    pub fn new(client: Arc<dyn ReasoningClient>) -> Self {
        Self { client }
    }
}

/// Build the critique from a lenient JSON reply. Scores are clamped here.
pub fn critique_from_reply(reply: &serde_json::Value) -> Critique {
    Critique {
        score: Score::from_raw(reply.get("score")),
        verdict: normalize_critique_verdict(reply.get("verdict").and_then(|v| v.as_str())),
        reason: string_field(reply, "reason").unwrap_or_else(|| "Analysis incomplete".into()),
        key_risks: text_list(reply, "key_risks"),
        key_opportunities: text_list(reply, "key_opportunities"),
        suggested_pivot: string_field(reply, "suggested_pivot"),
        pivot_rationale: string_field(reply, "pivot_rationale"),
    }
}

fn format_pivot_history(state: &StateSnapshot) -> String {
    let history = state.pivot_history();
    if history.is_empty() {
        return String::new();
    }
    let lines: Vec<String> = history
        .iter()
        .map(|p| {
            format!(
                "- Pivot #{}: '{}' -> '{}' (Score: {}, Reason: {})",
                p.attempt, p.prior_idea, p.revised_idea, p.triggering_score, p.rationale
            )
        })
        .collect();
    format!("\n**Previous Pivot History:**\n{}\n", lines.join("\n"))
}

#[async_trait]
impl Stage for Critic {
    async fn execute(
        &self,
        input: &StateSnapshot,
        config: &EngineConfig,
    ) -> Result<StateDelta, StageError> {
        let idea = require_idea(StageId::Critique, input)?;
        let original = original_idea(input).unwrap_or(&idea).to_string();

        let prompt = format!(
            "Critically evaluate the following startup idea as a Devil's Advocate:\n\n\
             **Original Idea:** {original}\n\
             **Current Idea Being Evaluated:** {idea}\n\
             **Pivot Attempts So Far:** {} of {} maximum\n{}\n\
             **Market Research Findings:**\n{}\n\n\
             **Competitive Analysis:**\n{}\n\n\
             ---\n\n\
             Your task:\n\
             1. Critically evaluate this idea's viability\n\
             2. Identify the top risks that could kill this startup\n\
             3. Identify genuine opportunities if any exist\n\
             4. Assign a score from 1-10 based on the scoring guidelines\n\
             5. If the score is {} or below, suggest a SPECIFIC pivot that addresses the key weaknesses\n\n\
             A pivot must be specific, address the problems you identified, and be a realistic \
             evolution of the original idea rather than a different business.",
            input.pivot_history().len(),
            config.max_pivot_attempts,
            format_pivot_history(input),
            format_market_research(input.market_research()),
            format_competitor_analysis(input.competitor_analysis()),
            config.pivot_threshold,
        );

        let reply = complete_json::<CritiqueReply>(
            self.client.as_ref(),
            CRITIC_PREAMBLE,
            &prompt,
            config.agent_timeout(),
        )
        .await?;
        let critique = critique_from_reply(&reply);
        let score = critique.score;
        info!(score = score.get(), verdict = %critique.verdict, "Critique complete");
        Ok(StateDelta::new()
            .set(StateValue::Critique(critique))
            .set(StateValue::Score(score)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coordination::CritiqueVerdict;
    use serde_json::json;

    #[test]
    fn test_out_of_domain_score_is_clamped() {
        let c = critique_from_reply(&json!({"score": 42, "verdict": "Strong invest"}));
        assert_eq!(c.score.get(), 10);
        assert_eq!(c.verdict, CritiqueVerdict::Invest);

        let c = critique_from_reply(&json!({"score": -3, "verdict": "no"}));
        assert_eq!(c.score.get(), 1);
        assert_eq!(c.verdict, CritiqueVerdict::Reject);
    }

    #[test]
    fn test_missing_fields_get_defaults() {
        let c = critique_from_reply(&json!({"score": "seven"}));
        assert_eq!(c.score.get(), 5);
        assert_eq!(c.verdict, CritiqueVerdict::Pivot);
        assert_eq!(c.reason, "Analysis incomplete");
        assert!(c.suggested_pivot.is_none());
    }
}
