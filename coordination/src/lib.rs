//! Scout Coordination Library
//!
//! Workflow engine behind the startup-idea evaluator:
//! - Router: pure next-step decisions for the debate and legacy pivot modes
//! - Orchestrator: drives stages, enforces bounds, checkpoints every transition
//! - State Store: append-only checkpoint log with resume
//! - Rate Governor: shared pacing of reasoning-service calls
//! - Debate Sub-Protocol: bounded Bull/Bear/Synthesizer exchange
//! - Stage Registry: catalog of stage functions with read/write contracts
//!
//! # Usage
//!
//! ```ignore
//! use coordination::{Engine, EngineConfig, MemoryCheckpointStore, StageRegistry};
//!
//! let engine = Engine::new(config, registry, MemoryCheckpointStore::new().shared())?;
//! let report = engine.start("Subscription box for indoor plants").await?;
//! println!("{}", report.summary_line());
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod config;
pub mod debate;
pub mod error;
pub mod governor;
pub mod normalize;
pub mod orchestrator;
pub mod report;
pub mod resilience;
pub mod router;
pub mod stages;
pub mod state;

pub use config::{ConfigError, ControlMode, EngineConfig, RoutingPolicy};
pub use debate::{
    DebateBrief, DebateParticipant, DebateProtocol, DebateRole, DebateStage, DebateTranscript,
    SynthesisVerdict,
};
pub use error::{EngineError, RetryCategory, ServiceError, StageError};
pub use governor::{CompletionRequest, GovernedClient, RateGovernor, ReasoningClient};
pub use normalize::{CritiqueVerdict, DebateVerdict, Score};
pub use orchestrator::Engine;
pub use report::{RunHistory, RunReport};
pub use resilience::{retry_with_backoff, RetryExhausted, RetryPolicy};
pub use router::{router_for, DebateRouter, NextAction, PivotDirective, PivotRouter, Router};
pub use stages::{Stage, StageId, StageRegistry, StageSpec};
pub use state::{
    Checkpoint, CheckpointKind, CheckpointStore, JsonlCheckpointStore, MemoryCheckpointStore,
    Run, RunOutcome, StateDelta, StateKey, StateSnapshot, StateValue,
};
