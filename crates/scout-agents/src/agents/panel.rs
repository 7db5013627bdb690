//! Bull, Bear and Synthesizer backed by the reasoning service.
//!
//! The protocol (turn order, cap, single synthesis) lives in the core; this
//! file only decides what each role is asked and how the closing verdict is
//! read back.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use coordination::normalize::{
    bool_field, extract_json_object, normalize_debate_verdict, string_field,
};
use coordination::{
    CompletionRequest, DebateBrief, DebateParticipant, DebateRole, DebateTranscript,
    DebateVerdict, ReasoningClient, Score, StageError, SynthesisVerdict,
};

use super::{format_competitor_analysis, format_market_research, text_list};
use crate::prompts::{synthesizer_preamble, BEAR_PREAMBLE, BULL_PREAMBLE};
use crate::structured::{schema_instruction, SynthesisReply};

const PARSE_FAILED: &str = "(Parsing failed - see transcript)";

pub struct DebatePanel {
    client: Arc<dyn ReasoningClient>,
    timeout: Duration,
}

impl DebatePanel {
    pub fn new(client: Arc<dyn ReasoningClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

fn brief_context(brief: &DebateBrief) -> String {
    format!(
        "=== STARTUP IDEA ===\n{}\n\n=== MARKET RESEARCH ===\n{}\n\n=== COMPETITIVE LANDSCAPE ===\n{}",
        brief.idea,
        format_market_research(brief.market_research.as_ref()),
        format_competitor_analysis(brief.competitor_analysis.as_ref())
    )
}

fn turn_instruction(role: DebateRole, transcript: &DebateTranscript) -> &'static str {
    let opening = transcript.last_by(role).is_none();
    match (role, opening) {
        (DebateRole::Bull, true) => {
            "As Bull, present your initial investment case for this startup idea. \
             Why should a VC invest? What's the opportunity?"
        }
        (DebateRole::Bull, false) => {
            "Respond to Bear's latest concerns. Can you address these risks? What mitigations \
             exist? If some concerns are valid, acknowledge them and suggest how to address them."
        }
        (DebateRole::Bear, true) => {
            "As Bear, challenge Bull's thesis. What are the critical risks and concerns?"
        }
        (DebateRole::Bear, false) | (DebateRole::Synthesizer, _) => {
            "Give your assessment of Bull's latest counter-arguments. Are the mitigations \
             sufficient? If the idea needs changes to be viable, what specific pivot would you \
             suggest?"
        }
    }
}

/// Read the synthesizer reply, falling back to a text scan when no JSON parses.
pub fn parse_synthesis(text: &str, idea: &str) -> SynthesisVerdict {
    if let Some(reply) = extract_json_object(text) {
        let final_idea = string_field(&reply, "final_idea").unwrap_or_else(|| idea.to_string());
        let idea_was_pivoted =
            bool_field(&reply, "idea_was_pivoted").unwrap_or(false) && final_idea != idea;
        return SynthesisVerdict {
            score: Score::from_raw(reply.get("score")),
            verdict: normalize_debate_verdict(reply.get("verdict").and_then(|v| v.as_str())),
            final_idea,
            idea_was_pivoted,
            bull_case: string_field(&reply, "bull_case").unwrap_or_default(),
            bear_case: string_field(&reply, "bear_case").unwrap_or_default(),
            synthesis: string_field(&reply, "synthesis").unwrap_or_default(),
            key_risks: text_list(&reply, "key_risks"),
            key_opportunities: text_list(&reply, "key_opportunities"),
            recommended_next_steps: text_list(&reply, "recommended_next_steps"),
        };
    }

    warn!("Synthesis reply was not JSON, falling back to text scan");
    let lower = text.to_lowercase();
    let verdict = if lower.contains("reject") {
        DebateVerdict::Reject
    } else if lower.contains("invest") && !lower.contains("conditional") {
        DebateVerdict::Invest
    } else {
        DebateVerdict::ConditionalInvest
    };
    SynthesisVerdict {
        score: Score::from_text(text).unwrap_or_default(),
        verdict,
        final_idea: idea.to_string(),
        idea_was_pivoted: false,
        bull_case: PARSE_FAILED.to_string(),
        bear_case: PARSE_FAILED.to_string(),
        synthesis: text.trim().chars().take(500).collect(),
        key_risks: Vec::new(),
        key_opportunities: Vec::new(),
        recommended_next_steps: Vec::new(),
    }
}

#[async_trait]
impl DebateParticipant for DebatePanel {
    async fn argue(
        &self,
        role: DebateRole,
        round: u32,
        brief: &DebateBrief,
        transcript: &DebateTranscript,
    ) -> Result<String, StageError> {
        let system = match role {
            DebateRole::Bull => BULL_PREAMBLE,
            DebateRole::Bear => BEAR_PREAMBLE,
            DebateRole::Synthesizer => {
                return Err(StageError::Fatal(
                    "synthesizer does not take argument turns".into(),
                ))
            }
        };
        let history = if transcript.is_empty() {
            String::new()
        } else {
            format!(
                "\n\n=== DEBATE SO FAR ===\n\n{}\n\n=== END ===",
                transcript.render()
            )
        };
        let prompt = format!(
            "{}{}\n\nRound {}. {}",
            brief_context(brief),
            history,
            round,
            turn_instruction(role, transcript)
        );
        let text = self
            .client
            .complete(&CompletionRequest::new(system, prompt), self.timeout)
            .await?;
        Ok(text.trim().to_string())
    }

    async fn synthesize(
        &self,
        brief: &DebateBrief,
        transcript: &DebateTranscript,
    ) -> Result<SynthesisVerdict, StageError> {
        let system = schema_instruction::<SynthesisReply>(&synthesizer_preamble(brief.pass_threshold))?;
        let prompt = format!(
            "{}\n\n=== DEBATE TRANSCRIPT ===\n\n{}\n\n=== END TRANSCRIPT ===\n\n\
             Based on this debate, produce your final verdict as Synthesizer. If the score is {} \
             or below but a viable pivot emerged, include it.",
            brief_context(brief),
            transcript.render(),
            brief.pass_threshold
        );
        let text = self
            .client
            .complete(&CompletionRequest::new(system, prompt), self.timeout)
            .await?;
        Ok(parse_synthesis(&text, &brief.idea))
    }
}
