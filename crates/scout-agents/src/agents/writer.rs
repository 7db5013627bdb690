//! Final write-up: an investment memo for ideas that pass, a market reality
//! report for the rest.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use coordination::state::{DebateResult, FinalReport, PivotRecord, ReportKind};
use coordination::{
    CompletionRequest, EngineConfig, ReasoningClient, Score, Stage, StageError, StageId,
    StateDelta, StateSnapshot, StateValue,
};

use super::{format_competitor_analysis, format_market_research, original_idea, require_idea};
use crate::prompts::{INVESTMENT_MEMO_PREAMBLE, MARKET_REALITY_PREAMBLE};

pub struct ReportWriter {
    client: Arc<dyn ReasoningClient>,
}

impl ReportWriter {
    pub fn new(client: Arc<dyn ReasoningClient>) -> Self {
        Self { client }
    }
}

/// Debate runs are judged against the pass threshold, pivot runs against the
/// pivot threshold.
pub fn report_kind(state: &StateSnapshot, config: &EngineConfig) -> ReportKind {
    let score = state.score().unwrap_or_default();
    let threshold = if state.debate().is_some() {
        config.pass_threshold
    } else {
        config.pivot_threshold
    };
    if score.exceeds(threshold) {
        ReportKind::InvestmentMemo
    } else {
        ReportKind::MarketRealityReport
    }
}

fn critical_analysis(state: &StateSnapshot) -> String {
    if let Some(debate) = state.debate() {
        return format!(
            "- Verdict: {}\n- Bull Case: {}\n- Bear Case: {}\n- Synthesis: {}\n\
             - Key Risks: {}\n- Key Opportunities: {}\n- Recommended Next Steps: {}",
            debate.verdict,
            debate.bull_case,
            debate.bear_case,
            debate.synthesis,
            debate.key_risks.join(", "),
            debate.key_opportunities.join(", "),
            debate.recommended_next_steps.join(", ")
        );
    }
    match state.critique() {
        Some(c) => format!(
            "- Verdict: {}\n- Key Risks: {}\n- Key Opportunities: {}\n- Reasoning: {}",
            c.verdict,
            c.key_risks.join(", "),
            c.key_opportunities.join(", "),
            c.reason
        ),
        None => "(No critical analysis available)".to_string(),
    }
}

fn instructions(kind: ReportKind) -> &'static str {
    match kind {
        ReportKind::InvestmentMemo => {
            "Write a comprehensive Investment Memo with the following sections:\n\
             1. **Executive Summary** - One paragraph thesis\n\
             2. **The Opportunity** - Market size, trends, timing\n\
             3. **Competitive Advantage** - How to win against competitors\n\
             4. **Risks & Mitigations** - Key risks and how to address them\n\
             5. **Recommendation** - Final investment recommendation\n\n\
             Use markdown formatting. Be specific and data-driven."
        }
        ReportKind::MarketRealityReport => {
            "Write a constructive Market Reality Report with the following sections:\n\
             1. **Executive Summary** - Honest assessment of why this market is challenging\n\
             2. **The Market Reality** - Detailed explanation of market conditions\n\
             3. **Why Traditional Approaches Fail** - Specific reasons this type of idea struggles\n\
             4. **Lessons Learned** - What the founder can take away from this analysis\n\
             5. **Alternative Directions** - 2-3 completely different approaches to consider\n\n\
             The tone should be educational and respectful, not dismissive."
        }
    }
}

fn pivot_section(history: &[PivotRecord]) -> String {
    let mut out = String::from("## Pivot History\n\n");
    for p in history {
        let _ = writeln!(out, "### Pivot #{}: {}", p.attempt, p.revised_idea);
        let _ = writeln!(out, "- **Previous idea:** {}", p.prior_idea);
        let _ = writeln!(out, "- **Score:** {}/10", p.triggering_score);
        let _ = writeln!(out, "- **Reason:** {}\n", p.rationale);
    }
    out
}

fn debate_section(debate: &DebateResult) -> String {
    let mut out = format!("## Debate Transcript\n\n{}\n", debate.transcript.render());
    if let Some(pivot) = debate.pivot_suggestion() {
        let _ = write!(out, "\n## Suggested Pivot\n\n{pivot}\n");
    }
    out
}

/// Header, generated body, then the history that led here.
pub fn assemble_report(
    kind: ReportKind,
    idea: &str,
    score: Score,
    body: &str,
    state: &StateSnapshot,
) -> String {
    let mut markdown = format!(
        "# {kind}\n\n**Idea:** {idea}\n**Score:** {score}/10\n**Generated:** {}\n\n---\n\n{}\n",
        Utc::now().format("%Y-%m-%d %H:%M UTC"),
        body.trim()
    );
    if let Some(debate) = state.debate() {
        markdown.push('\n');
        markdown.push_str(&debate_section(debate));
    } else if !state.pivot_history().is_empty() {
        markdown.push('\n');
        markdown.push_str(&pivot_section(state.pivot_history()));
    }
    markdown
}

#[async_trait]
impl Stage for ReportWriter {
    async fn execute(
        &self,
        input: &StateSnapshot,
        config: &EngineConfig,
    ) -> Result<StateDelta, StageError> {
        let idea = require_idea(StageId::WriteReport, input)?;
        let original = original_idea(input).unwrap_or(&idea).to_string();
        let score = input.score().unwrap_or_default();
        let kind = report_kind(input, config);

        let prompt = format!(
            "Write a {kind} for the following startup idea:\n\n\
             **Original Idea:** {original}\n\
             **Final Iteration:** {idea}\n\
             **Viability Score:** {score}/10\n\
             **Pivot Attempts:** {}\n\n\
             **Market Research:**\n{}\n\n\
             **Competitive Landscape:**\n{}\n\n\
             **Critical Analysis:**\n{}\n\n\
             ---\n\n{}",
            input.pivot_history().len(),
            format_market_research(input.market_research()),
            format_competitor_analysis(input.competitor_analysis()),
            critical_analysis(input),
            instructions(kind)
        );
        let system = match kind {
            ReportKind::InvestmentMemo => INVESTMENT_MEMO_PREAMBLE,
            ReportKind::MarketRealityReport => MARKET_REALITY_PREAMBLE,
        };
        let body = self
            .client
            .complete(&CompletionRequest::new(system, prompt), config.agent_timeout())
            .await?;

        let markdown = assemble_report(kind, &idea, score, &body, input);
        info!(kind = %kind, score = score.get(), chars = markdown.len(), "Report written");
        Ok(StateDelta::new().set(StateValue::Report(FinalReport { kind, markdown })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coordination::{DebateRole, DebateTranscript, DebateVerdict};

    fn scored(score: i64) -> StateSnapshot {
        StateSnapshot::seed("Robot lawn care")
            .merge(&StateDelta::new().set(StateValue::Score(Score::clamped(score))))
    }

    fn debate(pivoted: bool) -> DebateResult {
        let mut transcript = DebateTranscript::new();
        transcript.push_turn(DebateRole::Bull, 1, "Huge suburban market");
        transcript.push_turn(DebateRole::Bear, 1, "Hardware margins are thin");
        DebateResult {
            score: Score::clamped(5),
            verdict: DebateVerdict::ConditionalInvest,
            final_idea: if pivoted {
                "Robot lawn care for golf courses".into()
            } else {
                "Robot lawn care".into()
            },
            idea_was_pivoted: pivoted,
            bull_case: "b".into(),
            bear_case: "c".into(),
            synthesis: "s".into(),
            key_risks: vec![],
            key_opportunities: vec![],
            recommended_next_steps: vec![],
            transcript,
        }
    }

    #[test]
    fn test_kind_uses_pivot_threshold_without_debate() {
        let config = EngineConfig::default();
        assert_eq!(
            report_kind(&scored(config.pivot_threshold as i64 + 1), &config),
            ReportKind::InvestmentMemo
        );
        assert_eq!(
            report_kind(&scored(config.pivot_threshold as i64), &config),
            ReportKind::MarketRealityReport
        );
    }

    #[test]
    fn test_kind_uses_pass_threshold_with_debate() {
        let config = EngineConfig::default();
        let state = scored(config.pass_threshold as i64)
            .merge(&StateDelta::new().set(StateValue::Debate(debate(false))));
        assert_eq!(report_kind(&state, &config), ReportKind::MarketRealityReport);
    }

    #[test]
    fn test_report_appends_transcript_and_suggested_pivot() {
        let state = scored(5).merge(&StateDelta::new().set(StateValue::Debate(debate(true))));
        let md = assemble_report(
            ReportKind::MarketRealityReport,
            "Robot lawn care",
            Score::clamped(5),
            "  Body text.  ",
            &state,
        );
        assert!(md.starts_with("# Market Reality Report\n"));
        assert!(md.contains("**Score:** 5/10"));
        assert!(md.contains("Body text.\n"));
        assert!(md.contains("## Debate Transcript"));
        assert!(md.contains("BULL (Round 1):"));
        assert!(md.contains("## Suggested Pivot\n\nRobot lawn care for golf courses"));
        assert!(!md.contains("## Pivot History"));
    }

    #[test]
    fn test_report_without_debate_or_pivots_has_no_history() {
        let md = assemble_report(
            ReportKind::InvestmentMemo,
            "Robot lawn care",
            Score::clamped(8),
            "Body",
            &scored(8),
        );
        assert!(!md.contains("## Pivot History"));
        assert!(!md.contains("## Debate Transcript"));
    }
}
