//! Engine error taxonomy with retry classification.
//!
//! Every failure a stage can report is a [`StageError`]. The orchestrator
//! asks [`StageError::retry_category`] whether another attempt makes sense
//! instead of matching on message strings.
//!
//! | Category           | Retriable |
//! |--------------------|-----------|
//! | Transient          | yes       |
//! | RateLimit          | yes       |
//! | Timeout            | yes       |
//! | ParseFailure       | yes       |
//! | ContractViolation  | no        |
//! | Fatal              | no        |

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::router::RouterError;
use crate::stages::StageId;
use crate::state::{StateKey, StoreError};

/// Classification used by the orchestrator to decide whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryCategory {
    /// Network or backend hiccup.
    Transient,
    /// The reasoning service pushed back with a rate limit.
    RateLimit,
    /// The stage or a service call ran past its deadline.
    Timeout,
    /// Output could not be turned into the expected record.
    ParseFailure,
    /// The stage broke its declared read/write contract.
    ContractViolation,
    /// Anything else that another attempt will not fix.
    Fatal,
}

impl RetryCategory {
    pub fn is_retriable(self) -> bool {
        matches!(
            self,
            Self::Transient | Self::RateLimit | Self::Timeout | Self::ParseFailure
        )
    }
}

impl fmt::Display for RetryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Timeout => write!(f, "timeout"),
            Self::ParseFailure => write!(f, "parse_failure"),
            Self::ContractViolation => write!(f, "contract_violation"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// Failure reported by the reasoning-service client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("service returned an empty completion")]
    EmptyResponse,
}

impl ServiceError {
    pub fn retry_category(&self) -> RetryCategory {
        match self {
            Self::Transport(_) | Self::EmptyResponse => RetryCategory::Transient,
            Self::Timeout(_) => RetryCategory::Timeout,
            Self::RateLimited(_) => RetryCategory::RateLimit,
            Self::Status { status, .. } if *status == 429 => RetryCategory::RateLimit,
            Self::Status { status, .. } if *status >= 500 => RetryCategory::Transient,
            Self::Status { .. } => RetryCategory::Fatal,
        }
    }
}

/// Failure of a single stage attempt.
#[derive(Debug, Clone, Error)]
pub enum StageError {
    #[error("reasoning service: {0}")]
    Service(#[from] ServiceError),

    #[error("stage {stage} timed out after {after:?}")]
    Timeout { stage: StageId, after: Duration },

    #[error("could not parse structured output: {0}")]
    Parse(String),

    #[error("tool {tool} failed: {message}")]
    Tool { tool: String, message: String },

    #[error("stage {stage} wrote undeclared field {key}")]
    UndeclaredWrite { stage: StageId, key: StateKey },

    #[error("stage {stage} requires field {key} which is not present")]
    MissingInput { stage: StageId, key: StateKey },

    #[error("{0}")]
    Fatal(String),
}

impl StageError {
    pub fn retry_category(&self) -> RetryCategory {
        match self {
            Self::Service(e) => e.retry_category(),
            Self::Timeout { .. } => RetryCategory::Timeout,
            Self::Parse(_) => RetryCategory::ParseFailure,
            Self::Tool { .. } => RetryCategory::Transient,
            Self::UndeclaredWrite { .. } | Self::MissingInput { .. } => {
                RetryCategory::ContractViolation
            }
            Self::Fatal(_) => RetryCategory::Fatal,
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.retry_category().is_retriable()
    }
}

/// Errors surfaced by the orchestrator to its caller.
///
/// Every variant that concerns an existing run carries its id so the caller
/// can resume it later.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("checkpoint store: {0}")]
    Store(#[from] StoreError),

    #[error("run {run_id}: router contract violated: {source}")]
    Router {
        run_id: String,
        #[source]
        source: RouterError,
    },

    #[error("run {run_id}: stage {stage} failed after {attempts} attempt(s): {source}")]
    StageFailed {
        run_id: String,
        stage: StageId,
        attempts: u32,
        #[source]
        source: StageError,
    },

    #[error("run {run_id}: stage invocation ceiling of {limit} reached")]
    InvocationCeiling { run_id: String, limit: u32 },

    #[error("run {run_id}: cancelled between stages, resumable")]
    Cancelled { run_id: String },

    #[error("run {run_id}: checkpoint is corrupted: {reason}")]
    Corrupted { run_id: String, reason: String },

    #[error("no stage registered for {0}")]
    UnregisteredStage(StageId),

    #[error("registry is missing stages required for {mode}: {missing:?}")]
    IncompleteRegistry { mode: String, missing: Vec<StageId> },

    #[error("unknown run {0}")]
    UnknownRun(String),

    #[error("run {0} already exists")]
    RunExists(String),
}

impl EngineError {
    /// Run id this error concerns, if any.
    pub fn run_id(&self) -> Option<&str> {
        match self {
            Self::Router { run_id, .. }
            | Self::StageFailed { run_id, .. }
            | Self::InvocationCeiling { run_id, .. }
            | Self::Cancelled { run_id }
            | Self::Corrupted { run_id, .. } => Some(run_id),
            Self::UnknownRun(run_id) | Self::RunExists(run_id) => Some(run_id),
            _ => None,
        }
    }

    /// Whether calling `resume` on the same run can make progress.
    pub fn is_resumable(&self) -> bool {
        matches!(
            self,
            Self::StageFailed { .. } | Self::Cancelled { .. } | Self::Store(_)
        )
    }
}
