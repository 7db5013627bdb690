//! Run state, checkpoints and their persistence.
//!
//! # Architecture
//!
//! ```text
//! Run header ─┐
//!             ├─► Checkpoint { sequence, kind } ─► CheckpointStore::append
//! Snapshot  ──┘
//! ```
//!
//! - [`StateSnapshot`]: immutable map from [`StateKey`] to typed [`StateValue`]
//! - [`StateDelta`]: what a stage returns; merged with total overwrite per key
//! - [`Run`]: counters, frozen routing policy and outcome
//! - [`Checkpoint`]: run header plus snapshot after one transition
//! - [`CheckpointStore`]: append-only log with in-memory and JSONL backends
//!
//! # Usage
//!
//! ```ignore
//! use coordination::state::{JsonlCheckpointStore, CheckpointStore};
//!
//! let store = JsonlCheckpointStore::open("./runs").await?.shared();
//! if let Some(latest) = store.load_latest(&run_id).await? {
//!     println!("{} at #{}", latest.run.outcome, latest.sequence);
//! }
//! ```

pub mod checkpoint;
pub mod run;
pub mod schema;
pub mod snapshot;
pub mod store;
pub mod types;

pub use checkpoint::{validate_checkpoint, Checkpoint, CheckpointKind, IntegrityStatus};
pub use run::{Run, RunFailure, RunOutcome};
pub use schema::StateKey;
pub use snapshot::{StateDelta, StateSnapshot};
pub use store::{
    CheckpointStore, JsonlCheckpointStore, MemoryCheckpointStore, SharedCheckpointStore,
    StoreError, StoreResult,
};
pub use types::{
    Competitor, CompetitorAnalysis, Critique, DebateResult, FinalReport, MarketMaturity,
    MarketResearch, MarketSaturation, PivotRecord, ReportKind, StateValue, Validation,
};
