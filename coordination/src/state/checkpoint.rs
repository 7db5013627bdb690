//! Checkpoints: the unit of persistence and resume.
//!
//! Supports integrity validation before resume so a damaged log is
//! reported instead of silently replayed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::run::{Run, RunOutcome};
use super::snapshot::StateSnapshot;
use crate::stages::StageId;

/// What transition produced a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckpointKind {
    /// Run creation with the seeded snapshot.
    Created,
    StageCompleted { stage: StageId },
    Pivoted { attempt: u32 },
    /// Failure marker; the snapshot is the last good one.
    Failed { stage: StageId },
    Sealed { outcome: RunOutcome },
}

impl std::fmt::Display for CheckpointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::StageCompleted { stage } => write!(f, "completed {}", stage),
            Self::Pivoted { attempt } => write!(f, "pivot #{}", attempt),
            Self::Failed { stage } => write!(f, "failed at {}", stage),
            Self::Sealed { outcome } => write!(f, "sealed {}", outcome),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Schema version for forward compatibility.
    pub version: u32,
    pub run_id: String,
    /// Strictly increasing, gap-free, starting at 1.
    pub sequence: u64,
    pub kind: CheckpointKind,
    pub run: Run,
    pub snapshot: StateSnapshot,
    pub timestamp: DateTime<Utc>,
}

impl Checkpoint {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new(sequence: u64, kind: CheckpointKind, run: &Run, snapshot: &StateSnapshot) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            run_id: run.run_id.clone(),
            sequence,
            kind,
            run: run.clone(),
            snapshot: snapshot.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.run.is_sealed()
    }
}

/// Integrity check result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityStatus {
    Valid,
    /// Minor inconsistencies; resume is still safe.
    Recoverable { warnings: Vec<String> },
    Corrupted { errors: Vec<String> },
}

impl IntegrityStatus {
    pub fn can_resume(&self) -> bool {
        matches!(self, Self::Valid | Self::Recoverable { .. })
    }
}

/// Validate a checkpoint before resuming from it.
pub fn validate_checkpoint(checkpoint: &Checkpoint) -> IntegrityStatus {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();

    if checkpoint.version > Checkpoint::CURRENT_VERSION {
        errors.push(format!(
            "version {} > current {}",
            checkpoint.version,
            Checkpoint::CURRENT_VERSION
        ));
    }

    if checkpoint.sequence == 0 {
        errors.push("sequence 0 is never written".to_string());
    }

    if checkpoint.run_id != checkpoint.run.run_id {
        errors.push(format!(
            "checkpoint run id {} does not match header {}",
            checkpoint.run_id, checkpoint.run.run_id
        ));
    }

    match checkpoint.snapshot.idea() {
        None => errors.push("snapshot has no idea text".to_string()),
        Some(idea) if idea != checkpoint.run.current_idea => errors.push(format!(
            "snapshot idea {:?} differs from header {:?}",
            idea, checkpoint.run.current_idea
        )),
        Some(_) => {}
    }

    let history = checkpoint.snapshot.pivot_history();
    if history.len() as u32 != checkpoint.run.pivot_attempts {
        errors.push(format!(
            "pivot history has {} entries but header counts {}",
            history.len(),
            checkpoint.run.pivot_attempts
        ));
    }
    if checkpoint.run.pivot_attempts > checkpoint.run.policy.max_pivot_attempts {
        errors.push(format!(
            "pivot attempts {} exceed the configured maximum {}",
            checkpoint.run.pivot_attempts, checkpoint.run.policy.max_pivot_attempts
        ));
    }
    for (idx, record) in history.iter().enumerate() {
        if record.attempt != idx as u32 + 1 {
            errors.push(format!(
                "pivot record {} has attempt index {}",
                idx + 1,
                record.attempt
            ));
        }
    }

    match (checkpoint.kind, checkpoint.run.outcome) {
        (CheckpointKind::Sealed { outcome }, actual) if outcome != actual => {
            errors.push(format!(
                "sealed as {} but header outcome is {}",
                outcome, actual
            ));
        }
        (CheckpointKind::Sealed { .. }, _) => {}
        (CheckpointKind::Failed { .. }, RunOutcome::Failed) => {}
        (CheckpointKind::Failed { .. }, actual) => {
            warnings.push(format!("failure marker with outcome {}", actual));
        }
        (_, actual) if actual.is_sealed() => {
            errors.push(format!(
                "outcome {} recorded outside a sealing checkpoint",
                actual
            ));
        }
        _ => {}
    }

    if checkpoint.run.outcome == RunOutcome::Failed && checkpoint.run.failure.is_none() {
        warnings.push("failed run carries no failure detail".to_string());
    }

    if !errors.is_empty() {
        IntegrityStatus::Corrupted { errors }
    } else if !warnings.is_empty() {
        IntegrityStatus::Recoverable { warnings }
    } else {
        IntegrityStatus::Valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn created() -> Checkpoint {
        let run = Run::with_id("run-1", "idea", EngineConfig::default().routing_policy());
        Checkpoint::new(1, CheckpointKind::Created, &run, &StateSnapshot::seed("idea"))
    }

    #[test]
    fn test_fresh_checkpoint_is_valid() {
        assert_eq!(validate_checkpoint(&created()), IntegrityStatus::Valid);
    }

    #[test]
    fn test_idea_mismatch_is_corrupted() {
        let mut cp = created();
        cp.run.current_idea = "something else".into();
        let status = validate_checkpoint(&cp);
        assert!(!status.can_resume());
    }

    #[test]
    fn test_future_version_is_corrupted() {
        let mut cp = created();
        cp.version = Checkpoint::CURRENT_VERSION + 1;
        assert!(matches!(
            validate_checkpoint(&cp),
            IntegrityStatus::Corrupted { .. }
        ));
    }

    #[test]
    fn test_failed_without_detail_is_recoverable() {
        let mut cp = created();
        cp.kind = CheckpointKind::Failed {
            stage: StageId::MarketResearch,
        };
        cp.run.outcome = RunOutcome::Failed;
        let status = validate_checkpoint(&cp);
        assert!(matches!(status, IntegrityStatus::Recoverable { .. }));
        assert!(status.can_resume());
    }

    #[test]
    fn test_sealed_outcome_must_match_header() {
        let mut cp = created();
        cp.kind = CheckpointKind::Sealed {
            outcome: RunOutcome::Accepted,
        };
        cp.run.outcome = RunOutcome::Rejected;
        assert!(!validate_checkpoint(&cp).can_resume());
    }

    #[test]
    fn test_kind_serializes_with_tag() {
        let kind = CheckpointKind::StageCompleted {
            stage: StageId::Debate,
        };
        let json = serde_json::to_value(kind).unwrap();
        assert_eq!(json["kind"], "stage_completed");
        assert_eq!(json["stage"], "debate");
    }
}
