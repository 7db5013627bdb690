//! Run header: identity, counters and outcome of one evaluation session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::RoutingPolicy;
use crate::error::RetryCategory;
use crate::stages::StageId;

/// Terminal (or pending) outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    #[default]
    Pending,
    Accepted,
    Rejected,
    InvalidInput,
    /// Stage failure after exhausted retries. Not sealed: the run resumes
    /// from the last good snapshot.
    Failed,
}

impl RunOutcome {
    /// Sealed outcomes are final and make the run immutable.
    pub fn is_sealed(self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected | Self::InvalidInput)
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Accepted => write!(f, "accepted"),
            Self::Rejected => write!(f, "rejected"),
            Self::InvalidInput => write!(f, "invalid_input"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Why a run is currently marked [`RunOutcome::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    pub stage: StageId,
    pub category: RetryCategory,
    pub message: String,
    pub attempts: u32,
}

/// Mutable bookkeeping of a run, copied into every checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub run_id: String,
    pub original_idea: String,
    pub current_idea: String,
    /// Routing parameters frozen at creation.
    pub policy: RoutingPolicy,
    pub pivot_attempts: u32,
    /// Successful stage invocations so far.
    pub stage_invocations: u32,
    pub outcome: RunOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Run {
    pub fn new(idea: impl Into<String>, policy: RoutingPolicy) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), idea, policy)
    }

    pub fn with_id(run_id: impl Into<String>, idea: impl Into<String>, policy: RoutingPolicy) -> Self {
        let idea = idea.into();
        let now = Utc::now();
        Self {
            run_id: run_id.into(),
            original_idea: idea.clone(),
            current_idea: idea,
            policy,
            pivot_attempts: 0,
            stage_invocations: 0,
            outcome: RunOutcome::Pending,
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.outcome.is_sealed()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Record a stage failure. The run stays resumable.
    pub fn mark_failed(&mut self, failure: RunFailure) {
        self.outcome = RunOutcome::Failed;
        self.failure = Some(failure);
        self.touch();
    }

    /// Clear a previous failure marker when the run makes progress again.
    pub fn clear_failure(&mut self) {
        if self.outcome == RunOutcome::Failed {
            self.outcome = RunOutcome::Pending;
        }
        self.failure = None;
    }
}
