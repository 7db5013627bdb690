//! Router: pure routing decisions over the accumulated state.
//!
//! Both control modes share the same validation gate and research prefix,
//! then diverge:
//!
//! ```text
//! validate ─► invalid? ──────────────────────────────► terminate(invalid_input)
//!    │
//!    ▼
//! market_research ─► competitor_analysis ─┬─ debate ─► score > pass? ─► write_report ─► terminate
//!                                         │
//!                                         └─ critique ─► score > pivot? ─► write_report ─► terminate
//!                                                  │ no, attempts left
//!                                                  ▼
//!                                               pivot ─► (back to market_research)
//! ```
//!
//! A router never performs I/O and never mutates state. Calling
//! [`Router::decide`] twice on the same snapshot returns the same action.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ControlMode, RoutingPolicy};
use crate::normalize::Score;
use crate::stages::StageId;
use crate::state::{RunOutcome, StateSnapshot};

/// What the orchestrator should do next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum NextAction {
    Proceed { stage: StageId },
    Pivot(PivotDirective),
    Terminate { outcome: RunOutcome },
}

impl NextAction {
    pub fn proceed(stage: StageId) -> Self {
        Self::Proceed { stage }
    }

    pub fn terminate(outcome: RunOutcome) -> Self {
        Self::Terminate { outcome }
    }
}

/// Instruction to replace the current idea and restart research.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PivotDirective {
    /// 1-based index this pivot will carry in the history.
    pub attempt: u32,
    pub revised_idea: String,
    pub reason: String,
    pub triggering_score: Score,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    #[error("state has no idea text")]
    MissingIdea,

    #[error("{after} completed but no score is present")]
    MissingScore { after: StageId },

    #[error("pivot history holds {attempts} entries, above the maximum of {max}")]
    PivotBoundExceeded { attempts: u32, max: u32 },
}

/// A routing strategy.
pub trait Router: Send + Sync {
    fn mode(&self) -> ControlMode;

    fn decide(&self, state: &StateSnapshot) -> Result<NextAction, RouterError>;
}

/// Build the router for a frozen run policy.
pub fn router_for(policy: &RoutingPolicy) -> Box<dyn Router> {
    match policy.mode {
        ControlMode::Debate => Box::new(DebateRouter::new(policy.pass_threshold)),
        ControlMode::LegacyPivot => Box::new(PivotRouter::new(
            policy.pivot_threshold,
            policy.max_pivot_attempts,
        )),
    }
}

/// Validation gate plus the shared research prefix.
fn common_prefix(state: &StateSnapshot) -> Result<Option<NextAction>, RouterError> {
    if state.idea().is_none() {
        return Err(RouterError::MissingIdea);
    }
    let Some(validation) = state.validation() else {
        return Ok(Some(NextAction::proceed(StageId::ValidateInput)));
    };
    if !validation.is_valid {
        return Ok(Some(NextAction::terminate(RunOutcome::InvalidInput)));
    }
    if state.market_research().is_none() {
        return Ok(Some(NextAction::proceed(StageId::MarketResearch)));
    }
    if state.competitor_analysis().is_none() {
        return Ok(Some(NextAction::proceed(StageId::CompetitorAnalysis)));
    }
    Ok(None)
}

/// Write the report once, then seal with `outcome`.
fn write_up_then(state: &StateSnapshot, outcome: RunOutcome) -> NextAction {
    if state.report().is_none() {
        NextAction::proceed(StageId::WriteReport)
    } else {
        NextAction::terminate(outcome)
    }
}

/// Default mode: a single debate decides pass or fail. No loop-back edge.
#[derive(Debug, Clone, Copy)]
pub struct DebateRouter {
    pass_threshold: u8,
}

impl DebateRouter {
    pub fn new(pass_threshold: u8) -> Self {
        Self { pass_threshold }
    }
}

impl Router for DebateRouter {
    fn mode(&self) -> ControlMode {
        ControlMode::Debate
    }

    fn decide(&self, state: &StateSnapshot) -> Result<NextAction, RouterError> {
        if let Some(action) = common_prefix(state)? {
            return Ok(action);
        }
        if state.debate().is_none() {
            return Ok(NextAction::proceed(StageId::Debate));
        }
        let score = state.score().ok_or(RouterError::MissingScore {
            after: StageId::Debate,
        })?;
        let outcome = if score.exceeds(self.pass_threshold) {
            RunOutcome::Accepted
        } else {
            RunOutcome::Rejected
        };
        Ok(write_up_then(state, outcome))
    }
}

/// Legacy mode: a single critic with a bounded pivot-and-retry loop.
#[derive(Debug, Clone, Copy)]
pub struct PivotRouter {
    pivot_threshold: u8,
    max_pivot_attempts: u32,
}

impl PivotRouter {
    pub fn new(pivot_threshold: u8, max_pivot_attempts: u32) -> Self {
        Self {
            pivot_threshold,
            max_pivot_attempts,
        }
    }
}

impl Router for PivotRouter {
    fn mode(&self) -> ControlMode {
        ControlMode::LegacyPivot
    }

    fn decide(&self, state: &StateSnapshot) -> Result<NextAction, RouterError> {
        let attempts = state.pivot_history().len() as u32;
        if attempts > self.max_pivot_attempts {
            return Err(RouterError::PivotBoundExceeded {
                attempts,
                max: self.max_pivot_attempts,
            });
        }
        if let Some(action) = common_prefix(state)? {
            return Ok(action);
        }
        let Some(critique) = state.critique() else {
            return Ok(NextAction::proceed(StageId::Critique));
        };
        let score = state.score().ok_or(RouterError::MissingScore {
            after: StageId::Critique,
        })?;

        if score.exceeds(self.pivot_threshold) {
            return Ok(write_up_then(state, RunOutcome::Accepted));
        }
        if attempts >= self.max_pivot_attempts {
            return Ok(write_up_then(state, RunOutcome::Rejected));
        }

        let current = state.idea().unwrap_or_default();
        let revised_idea = critique
            .suggested_pivot
            .clone()
            .or_else(|| critique.pivot_rationale.clone())
            .unwrap_or_else(|| format!("Refined version of: {}", current));
        let reason = critique
            .pivot_rationale
            .clone()
            .unwrap_or_else(|| critique.reason.clone());

        Ok(NextAction::Pivot(PivotDirective {
            attempt: attempts + 1,
            revised_idea,
            reason,
            triggering_score: score,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debate::DebateTranscript;
    use crate::normalize::{CritiqueVerdict, DebateVerdict};
    use crate::state::*;
    use chrono::Utc;

    fn researched(idea: &str) -> StateSnapshot {
        StateSnapshot::seed(idea).merge(
            &StateDelta::new()
                .set(StateValue::Validation(Validation::valid()))
                .set(StateValue::MarketResearch(MarketResearch::default()))
                .set(StateValue::CompetitorAnalysis(CompetitorAnalysis::default())),
        )
    }

    fn with_debate(state: &StateSnapshot, score: i64) -> StateSnapshot {
        let result = DebateResult {
            score: Score::clamped(score),
            verdict: DebateVerdict::ConditionalInvest,
            final_idea: "idea".into(),
            idea_was_pivoted: false,
            bull_case: String::new(),
            bear_case: String::new(),
            synthesis: String::new(),
            key_risks: vec![],
            key_opportunities: vec![],
            recommended_next_steps: vec![],
            transcript: DebateTranscript::default(),
        };
        state.merge(
            &StateDelta::new()
                .set(StateValue::Debate(result))
                .set(StateValue::Score(Score::clamped(score))),
        )
    }

    fn with_critique(state: &StateSnapshot, score: i64, pivot: Option<&str>) -> StateSnapshot {
        let critique = Critique {
            score: Score::clamped(score),
            verdict: CritiqueVerdict::Pivot,
            reason: "weak moat".into(),
            key_risks: vec![],
            key_opportunities: vec![],
            suggested_pivot: pivot.map(str::to_string),
            pivot_rationale: None,
        };
        state.merge(
            &StateDelta::new()
                .set(StateValue::Critique(critique))
                .set(StateValue::Score(Score::clamped(score))),
        )
    }

    fn with_report(state: &StateSnapshot) -> StateSnapshot {
        state.merge(&StateDelta::new().set(StateValue::Report(FinalReport {
            kind: ReportKind::InvestmentMemo,
            markdown: "# memo".into(),
        })))
    }

    fn with_pivots(state: &StateSnapshot, n: u32) -> StateSnapshot {
        let history = (1..=n)
            .map(|attempt| PivotRecord {
                attempt,
                prior_idea: "a".into(),
                revised_idea: "b".into(),
                triggering_score: Score::clamped(3),
                rationale: String::new(),
                timestamp: Utc::now(),
            })
            .collect();
        state.merge(&StateDelta::new().set(StateValue::PivotHistory(history)))
    }

    #[test]
    fn test_validation_gate_runs_first() {
        let router = DebateRouter::new(5);
        let state = StateSnapshot::seed("idea");
        assert_eq!(
            router.decide(&state).unwrap(),
            NextAction::proceed(StageId::ValidateInput)
        );

        let invalid = state.merge(
            &StateDelta::new().set(StateValue::Validation(Validation::invalid("gibberish"))),
        );
        assert_eq!(
            router.decide(&invalid).unwrap(),
            NextAction::terminate(RunOutcome::InvalidInput)
        );
        // Same answer in legacy mode.
        assert_eq!(
            PivotRouter::new(5, 3).decide(&invalid).unwrap(),
            NextAction::terminate(RunOutcome::InvalidInput)
        );
    }

    #[test]
    fn test_research_prefix_order() {
        let router = DebateRouter::new(5);
        let validated = StateSnapshot::seed("idea")
            .merge(&StateDelta::new().set(StateValue::Validation(Validation::valid())));
        assert_eq!(
            router.decide(&validated).unwrap(),
            NextAction::proceed(StageId::MarketResearch)
        );
        let researched = validated
            .merge(&StateDelta::new().set(StateValue::MarketResearch(MarketResearch::default())));
        assert_eq!(
            router.decide(&researched).unwrap(),
            NextAction::proceed(StageId::CompetitorAnalysis)
        );
    }

    #[test]
    fn test_debate_accept_and_reject() {
        let router = DebateRouter::new(5);
        let base = researched("idea");
        assert_eq!(
            router.decide(&base).unwrap(),
            NextAction::proceed(StageId::Debate)
        );

        let high = with_debate(&base, 7);
        assert_eq!(
            router.decide(&high).unwrap(),
            NextAction::proceed(StageId::WriteReport)
        );
        assert_eq!(
            router.decide(&with_report(&high)).unwrap(),
            NextAction::terminate(RunOutcome::Accepted)
        );

        let low = with_report(&with_debate(&base, 3));
        assert_eq!(
            router.decide(&low).unwrap(),
            NextAction::terminate(RunOutcome::Rejected)
        );
    }

    #[test]
    fn test_score_equal_to_threshold_rejects() {
        let router = DebateRouter::new(5);
        let state = with_report(&with_debate(&researched("idea"), 5));
        assert_eq!(
            router.decide(&state).unwrap(),
            NextAction::terminate(RunOutcome::Rejected)
        );
    }

    #[test]
    fn test_debate_without_score_fails_loudly() {
        let router = DebateRouter::new(5);
        let state = with_debate(&researched("idea"), 7)
            .merge(&StateDelta::new().clear(crate::state::StateKey::Score));
        assert_eq!(
            router.decide(&state).unwrap_err(),
            RouterError::MissingScore {
                after: StageId::Debate
            }
        );
    }

    #[test]
    fn test_legacy_low_score_pivots_with_suggestion() {
        let router = PivotRouter::new(5, 3);
        let state = with_critique(&researched("dog walking"), 4, Some("B2B dog walking"));
        match router.decide(&state).unwrap() {
            NextAction::Pivot(directive) => {
                assert_eq!(directive.attempt, 1);
                assert_eq!(directive.revised_idea, "B2B dog walking");
                assert_eq!(directive.triggering_score, Score::clamped(4));
            }
            other => panic!("expected pivot, got {:?}", other),
        }
    }

    #[test]
    fn test_legacy_pivot_fallback_idea() {
        let router = PivotRouter::new(5, 3);
        let state = with_critique(&researched("dog walking"), 2, None);
        match router.decide(&state).unwrap() {
            NextAction::Pivot(directive) => {
                assert_eq!(directive.revised_idea, "Refined version of: dog walking");
                assert_eq!(directive.reason, "weak moat");
            }
            other => panic!("expected pivot, got {:?}", other),
        }
    }

    #[test]
    fn test_legacy_exhausted_pivots_reject() {
        let router = PivotRouter::new(5, 3);
        let state = with_critique(&with_pivots(&researched("idea"), 3), 2, Some("again"));
        assert_eq!(
            router.decide(&state).unwrap(),
            NextAction::proceed(StageId::WriteReport)
        );
        assert_eq!(
            router.decide(&with_report(&state)).unwrap(),
            NextAction::terminate(RunOutcome::Rejected)
        );
    }

    #[test]
    fn test_legacy_zero_max_never_pivots() {
        let router = PivotRouter::new(5, 0);
        let state = with_critique(&researched("idea"), 1, Some("x"));
        assert_eq!(
            router.decide(&state).unwrap(),
            NextAction::proceed(StageId::WriteReport)
        );
    }

    #[test]
    fn test_legacy_accepts_above_threshold() {
        let router = PivotRouter::new(5, 3);
        let state = with_report(&with_critique(&with_pivots(&researched("idea"), 1), 6, None));
        assert_eq!(
            router.decide(&state).unwrap(),
            NextAction::terminate(RunOutcome::Accepted)
        );
    }

    #[test]
    fn test_legacy_history_over_bound_is_error() {
        let router = PivotRouter::new(5, 1);
        let state = with_pivots(&researched("idea"), 2);
        assert!(matches!(
            router.decide(&state),
            Err(RouterError::PivotBoundExceeded { attempts: 2, max: 1 })
        ));
    }

    #[test]
    fn test_decide_is_idempotent() {
        let router = PivotRouter::new(5, 3);
        let state = with_critique(&researched("idea"), 4, Some("pivot"));
        assert_eq!(router.decide(&state), router.decide(&state));
    }

    #[test]
    fn test_router_for_mode() {
        let mut policy = crate::config::EngineConfig::default().routing_policy();
        assert_eq!(router_for(&policy).mode(), ControlMode::Debate);
        policy.mode = ControlMode::LegacyPivot;
        assert_eq!(router_for(&policy).mode(), ControlMode::LegacyPivot);
    }
}
