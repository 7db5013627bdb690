//! Debate state machine: phases, transitions, and session tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Phase of a debate session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebatePhase {
    /// Session created but not started.
    Idle,
    /// Bull argues for the idea.
    BullTurn,
    /// Bear argues against it.
    BearTurn,
    /// Synthesizer weighs both sides and scores.
    SynthesisTurn,
    Done,
}

impl DebatePhase {
    pub fn is_terminal(self) -> bool {
        self == Self::Done
    }

    /// Valid transitions from this phase.
    pub fn valid_transitions(self) -> &'static [DebatePhase] {
        match self {
            Self::Idle => &[Self::BullTurn, Self::SynthesisTurn],
            Self::BullTurn => &[Self::BearTurn, Self::SynthesisTurn],
            Self::BearTurn => &[Self::BullTurn, Self::SynthesisTurn],
            Self::SynthesisTurn => &[Self::Done],
            Self::Done => &[],
        }
    }
}

impl std::fmt::Display for DebatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::BullTurn => write!(f, "bull_turn"),
            Self::BearTurn => write!(f, "bear_turn"),
            Self::SynthesisTurn => write!(f, "synthesis_turn"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// A phase transition record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebateTransition {
    pub from: DebatePhase,
    pub to: DebatePhase,
    pub timestamp: DateTime<Utc>,
}

/// Error for invalid state transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition {from} → {to}: {reason}")]
pub struct TransitionError {
    pub from: DebatePhase,
    pub to: DebatePhase,
    pub reason: String,
}

/// Turn bookkeeping for one debate.
///
/// `max_turns` caps bull and bear turns combined. Once the cap is reached the
/// only way forward is the synthesis turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateSession {
    pub phase: DebatePhase,
    /// Bull/bear turns entered so far.
    pub turns_taken: u32,
    pub max_turns: u32,
    pub transitions: Vec<DebateTransition>,
}

impl DebateSession {
    pub fn new(max_turns: u32) -> Self {
        Self {
            phase: DebatePhase::Idle,
            turns_taken: 0,
            max_turns,
            transitions: Vec::new(),
        }
    }

    /// Transition to `to`, enforcing both the phase graph and the turn cap.
    pub fn transition(&mut self, to: DebatePhase) -> Result<(), TransitionError> {
        if !self.phase.valid_transitions().contains(&to) {
            return Err(TransitionError {
                from: self.phase,
                to,
                reason: format!(
                    "not a valid transition (allowed: {:?})",
                    self.phase.valid_transitions()
                ),
            });
        }
        let is_argument = matches!(to, DebatePhase::BullTurn | DebatePhase::BearTurn);
        if is_argument && !self.has_turns_remaining() {
            return Err(TransitionError {
                from: self.phase,
                to,
                reason: format!("turn cap of {} reached", self.max_turns),
            });
        }

        self.transitions.push(DebateTransition {
            from: self.phase,
            to,
            timestamp: Utc::now(),
        });
        self.phase = to;
        if is_argument {
            self.turns_taken += 1;
        }
        Ok(())
    }

    /// The phase the protocol must enter next.
    ///
    /// Bull and bear alternate strictly, starting with bull; once the cap is
    /// hit, synthesis follows unconditionally.
    pub fn next_phase(&self) -> DebatePhase {
        match self.phase {
            DebatePhase::Idle if self.max_turns == 0 => DebatePhase::SynthesisTurn,
            DebatePhase::Idle => DebatePhase::BullTurn,
            DebatePhase::BullTurn | DebatePhase::BearTurn if !self.has_turns_remaining() => {
                DebatePhase::SynthesisTurn
            }
            DebatePhase::BullTurn => DebatePhase::BearTurn,
            DebatePhase::BearTurn => DebatePhase::BullTurn,
            DebatePhase::SynthesisTurn | DebatePhase::Done => DebatePhase::Done,
        }
    }

    pub fn advance(&mut self) -> Result<DebatePhase, TransitionError> {
        let next = self.next_phase();
        self.transition(next)?;
        Ok(next)
    }

    pub fn has_turns_remaining(&self) -> bool {
        self.turns_taken < self.max_turns
    }

    /// 1-based round of the current turn; a round is one bull plus one bear turn.
    pub fn current_round(&self) -> u32 {
        self.turns_taken.div_ceil(2).max(1)
    }

    pub fn is_complete(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Compact status line.
    pub fn status_line(&self) -> String {
        format!(
            "[{}] turn {}/{} | round {}",
            self.phase,
            self.turns_taken,
            self.max_turns,
            self.current_round()
        )
    }
}
