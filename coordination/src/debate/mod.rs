//! Debate Sub-Protocol: Bull/Bear/Synthesizer exchange
//!
//! A bounded exchange run inside a single `debate` stage invocation.
//!
//! # Debate Flow
//!
//! ```text
//! Idle → BullTurn → BearTurn → BullTurn → ... (max_turns)
//!                                   │
//!                                   ▼
//!                            SynthesisTurn → Done
//! ```
//!
//! Bull and bear alternate strictly. The cap is enforced by the state
//! machine regardless of content, and synthesis runs exactly once.

pub mod protocol;
pub mod state;
pub mod transcript;

pub use protocol::{DebateBrief, DebateParticipant, DebateProtocol, DebateStage, SynthesisVerdict};
pub use state::{DebatePhase, DebateSession, DebateTransition, TransitionError};
pub use transcript::{DebateRole, DebateTranscript, TranscriptEntry};
