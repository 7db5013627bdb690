//! Debate protocol: drives bull/bear turns and the closing synthesis.
//!
//! Ties the state machine to a [`DebateParticipant`] so a complete debate
//! runs inside a single stage invocation.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::state::{DebatePhase, DebateSession};
use super::transcript::{DebateRole, DebateTranscript};
use crate::config::EngineConfig;
use crate::error::StageError;
use crate::normalize::{DebateVerdict, Score};
use crate::stages::{Stage, StageId};
use crate::state::{
    CompetitorAnalysis, DebateResult, MarketResearch, StateDelta, StateKey, StateSnapshot,
    StateValue,
};

/// What every turn gets to see besides the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebateBrief {
    pub idea: String,
    pub market_research: Option<MarketResearch>,
    pub competitor_analysis: Option<CompetitorAnalysis>,
    /// Scores strictly above this pass; the synthesizer is told so.
    pub pass_threshold: u8,
}

impl DebateBrief {
    /// Build from a snapshot projected to the debate stage's reads.
    pub fn from_snapshot(state: &StateSnapshot, pass_threshold: u8) -> Result<Self, StageError> {
        let idea = state.idea().ok_or(StageError::MissingInput {
            stage: StageId::Debate,
            key: StateKey::Idea,
        })?;
        Ok(Self {
            idea: idea.to_string(),
            market_research: state.market_research().cloned(),
            competitor_analysis: state.competitor_analysis().cloned(),
            pass_threshold,
        })
    }
}

/// Structured output of the synthesis turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisVerdict {
    pub score: Score,
    pub verdict: DebateVerdict,
    pub final_idea: String,
    pub idea_was_pivoted: bool,
    pub bull_case: String,
    pub bear_case: String,
    pub synthesis: String,
    pub key_risks: Vec<String>,
    pub key_opportunities: Vec<String>,
    pub recommended_next_steps: Vec<String>,
}

/// The three reasoning roles behind one seam.
#[async_trait]
pub trait DebateParticipant: Send + Sync {
    /// One bull or bear utterance given everything said so far.
    async fn argue(
        &self,
        role: DebateRole,
        round: u32,
        brief: &DebateBrief,
        transcript: &DebateTranscript,
    ) -> Result<String, StageError>;

    /// Closing verdict over the full transcript.
    async fn synthesize(
        &self,
        brief: &DebateBrief,
        transcript: &DebateTranscript,
    ) -> Result<SynthesisVerdict, StageError>;
}

/// Fixed three-role, N-turn debate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebateProtocol {
    /// Bull plus bear turns before synthesis.
    pub max_turns: u32,
}

impl DebateProtocol {
    pub fn new(max_turns: u32) -> Self {
        Self { max_turns }
    }

    /// Run the debate to completion.
    ///
    /// Exactly `max_turns` argument turns are taken, alternating bull and
    /// bear, followed by exactly one synthesis turn.
    pub async fn run(
        &self,
        participant: &dyn DebateParticipant,
        brief: &DebateBrief,
    ) -> Result<DebateResult, StageError> {
        let mut session = DebateSession::new(self.max_turns);
        let mut transcript = DebateTranscript::new();

        loop {
            let phase = session
                .advance()
                .map_err(|e| StageError::Fatal(e.to_string()))?;
            let round = session.current_round();
            match phase {
                DebatePhase::BullTurn | DebatePhase::BearTurn => {
                    let role = if phase == DebatePhase::BullTurn {
                        DebateRole::Bull
                    } else {
                        DebateRole::Bear
                    };
                    let utterance = participant.argue(role, round, brief, &transcript).await?;
                    debug!(%role, round, turn = session.turns_taken, "Debate turn recorded");
                    transcript.push_turn(role, round, utterance);
                }
                DebatePhase::SynthesisTurn => {
                    let verdict = participant.synthesize(brief, &transcript).await?;
                    let pivot = verdict
                        .idea_was_pivoted
                        .then(|| verdict.final_idea.clone());
                    transcript.push_synthesis(
                        round,
                        verdict.synthesis.clone(),
                        verdict.score,
                        pivot,
                    );
                    info!(
                        score = verdict.score.get(),
                        verdict = %verdict.verdict,
                        turns = session.turns_taken,
                        "Debate synthesized"
                    );
                    session
                        .advance()
                        .map_err(|e| StageError::Fatal(e.to_string()))?;
                    return Ok(DebateResult {
                        score: verdict.score,
                        verdict: verdict.verdict,
                        final_idea: verdict.final_idea,
                        idea_was_pivoted: verdict.idea_was_pivoted,
                        bull_case: verdict.bull_case,
                        bear_case: verdict.bear_case,
                        synthesis: verdict.synthesis,
                        key_risks: verdict.key_risks,
                        key_opportunities: verdict.key_opportunities,
                        recommended_next_steps: verdict.recommended_next_steps,
                        transcript,
                    });
                }
                DebatePhase::Idle | DebatePhase::Done => {
                    return Err(StageError::Fatal(format!(
                        "debate advanced into unexpected phase {}",
                        phase
                    )));
                }
            }
        }
    }
}

/// The `debate` stage: runs the protocol and writes the result and score.
pub struct DebateStage {
    participant: Arc<dyn DebateParticipant>,
}

impl DebateStage {
    pub fn new(participant: Arc<dyn DebateParticipant>) -> Self {
        Self { participant }
    }
}

#[async_trait]
impl Stage for DebateStage {
    async fn execute(
        &self,
        input: &StateSnapshot,
        config: &EngineConfig,
    ) -> Result<StateDelta, StageError> {
        let brief = DebateBrief::from_snapshot(input, config.pass_threshold)?;
        let protocol = DebateProtocol::new(config.debate_max_rounds);
        let result = protocol.run(self.participant.as_ref(), &brief).await?;
        let score = result.score;
        Ok(StateDelta::new()
            .set(StateValue::Debate(result))
            .set(StateValue::Score(score)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Records the role order it was asked for and echoes it back.
    struct Scripted {
        score: i64,
        calls: AtomicU32,
        synth_calls: AtomicU32,
    }

    impl Scripted {
        fn new(score: i64) -> Self {
            Self {
                score,
                calls: AtomicU32::new(0),
                synth_calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl DebateParticipant for Scripted {
        async fn argue(
            &self,
            role: DebateRole,
            round: u32,
            _brief: &DebateBrief,
            transcript: &DebateTranscript,
        ) -> Result<String, StageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{} r{} after {}", role, round, transcript.len()))
        }

        async fn synthesize(
            &self,
            brief: &DebateBrief,
            _transcript: &DebateTranscript,
        ) -> Result<SynthesisVerdict, StageError> {
            self.synth_calls.fetch_add(1, Ordering::SeqCst);
            Ok(SynthesisVerdict {
                score: Score::clamped(self.score),
                verdict: DebateVerdict::ConditionalInvest,
                final_idea: format!("{} for enterprises", brief.idea),
                idea_was_pivoted: true,
                bull_case: "big market".into(),
                bear_case: "crowded".into(),
                synthesis: "on balance, maybe".into(),
                key_risks: vec![],
                key_opportunities: vec![],
                recommended_next_steps: vec![],
            })
        }
    }

    fn brief() -> DebateBrief {
        DebateBrief {
            idea: "AI tutor".into(),
            market_research: None,
            competitor_analysis: None,
            pass_threshold: 5,
        }
    }

    #[tokio::test]
    async fn test_six_turns_then_one_synthesis() {
        let participant = Scripted::new(7);
        let result = DebateProtocol::new(6)
            .run(&participant, &brief())
            .await
            .unwrap();

        assert_eq!(participant.calls.load(Ordering::SeqCst), 6);
        assert_eq!(participant.synth_calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.transcript.len(), 7);
        assert!(result.transcript.is_well_formed(6));

        let roles: Vec<_> = result.transcript.entries().iter().map(|e| e.role).collect();
        assert_eq!(roles[0], DebateRole::Bull);
        assert_eq!(roles[1], DebateRole::Bear);
        assert_eq!(roles[5], DebateRole::Bear);
        assert_eq!(roles[6], DebateRole::Synthesizer);
        assert_eq!(result.transcript.entries()[5].round, 3);
    }

    #[tokio::test]
    async fn test_each_turn_sees_prior_transcript() {
        let participant = Scripted::new(5);
        let result = DebateProtocol::new(2)
            .run(&participant, &brief())
            .await
            .unwrap();
        assert_eq!(result.transcript.entries()[0].utterance, "bull r1 after 0");
        assert_eq!(result.transcript.entries()[1].utterance, "bear r1 after 1");
    }

    #[tokio::test]
    async fn test_synthesis_carries_score_and_pivot() {
        let result = DebateProtocol::new(1)
            .run(&Scripted::new(3), &brief())
            .await
            .unwrap();
        let synthesis = result.transcript.synthesis().unwrap();
        assert_eq!(synthesis.score, Some(Score::clamped(3)));
        assert_eq!(
            synthesis.pivot_suggestion.as_deref(),
            Some("AI tutor for enterprises")
        );
        assert_eq!(result.pivot_suggestion(), Some("AI tutor for enterprises"));
    }

    #[tokio::test]
    async fn test_stage_writes_debate_and_score_only() {
        let stage = DebateStage::new(Arc::new(Scripted::new(8)));
        let input = StateSnapshot::seed("AI tutor");
        let delta = stage
            .execute(&input, &EngineConfig::default())
            .await
            .unwrap();
        StageId::Debate
            .spec()
            .check_delta(StageId::Debate, &delta)
            .unwrap();
        let merged = input.merge(&delta);
        assert_eq!(merged.score(), Some(Score::clamped(8)));
        assert!(merged.debate().is_some());
    }

    #[tokio::test]
    async fn test_stage_requires_idea() {
        let stage = DebateStage::new(Arc::new(Scripted::new(8)));
        let err = stage
            .execute(&StateSnapshot::default(), &EngineConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::MissingInput { .. }));
    }
}
