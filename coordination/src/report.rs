//! Reported outcome of a run.

use serde::{Deserialize, Serialize};

use crate::debate::DebateTranscript;
use crate::normalize::Score;
use crate::state::{Checkpoint, FinalReport, PivotRecord, RunFailure, RunOutcome};

/// Debate transcript in debate mode, pivot history in legacy mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "entries", rename_all = "snake_case")]
pub enum RunHistory {
    Transcript(DebateTranscript),
    Pivots(Vec<PivotRecord>),
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub outcome: RunOutcome,
    pub final_score: Option<Score>,
    pub original_idea: String,
    pub final_idea: String,
    pub history: RunHistory,
    pub report: Option<FinalReport>,
    /// Validation failure reason for `invalid_input` runs.
    pub rejection_reason: Option<String>,
    /// Informational revision proposed by the debate synthesizer.
    pub pivot_suggestion: Option<String>,
    pub failure: Option<RunFailure>,
    /// Sequence of the checkpoint this report was read from.
    pub sequence: u64,
}

impl RunReport {
    pub fn from_checkpoint(checkpoint: &Checkpoint) -> Self {
        let snapshot = &checkpoint.snapshot;
        let run = &checkpoint.run;

        let history = if let Some(debate) = snapshot.debate() {
            RunHistory::Transcript(debate.transcript.clone())
        } else if !snapshot.pivot_history().is_empty() {
            RunHistory::Pivots(snapshot.pivot_history().to_vec())
        } else {
            RunHistory::None
        };

        let rejection_reason = snapshot
            .validation()
            .filter(|v| !v.is_valid)
            .and_then(|v| v.rejection_reason.clone())
            .or_else(|| match run.outcome {
                RunOutcome::Rejected => snapshot
                    .critique()
                    .map(|c| c.reason.clone())
                    .or_else(|| snapshot.debate().map(|d| d.bear_case.clone())),
                _ => None,
            });

        Self {
            run_id: run.run_id.clone(),
            outcome: run.outcome,
            final_score: snapshot.score(),
            original_idea: run.original_idea.clone(),
            final_idea: run.current_idea.clone(),
            history,
            report: snapshot.report().cloned(),
            rejection_reason,
            pivot_suggestion: snapshot
                .debate()
                .and_then(|d| d.pivot_suggestion())
                .map(str::to_string),
            failure: run.failure.clone(),
            sequence: checkpoint.sequence,
        }
    }

    pub fn pivot_count(&self) -> usize {
        match &self.history {
            RunHistory::Pivots(p) => p.len(),
            _ => 0,
        }
    }

    /// One-line summary for logs and the CLI.
    pub fn summary_line(&self) -> String {
        let score = self
            .final_score
            .map(|s| s.to_string())
            .unwrap_or_else(|| "n/a".to_string());
        format!(
            "[{}] run={} score={} pivots={} idea={:?}",
            self.outcome.to_string().to_uppercase(),
            self.run_id,
            score,
            self.pivot_count(),
            self.final_idea
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::state::{CheckpointKind, Run, StateDelta, StateSnapshot, StateValue, Validation};

    #[test]
    fn test_invalid_input_report_carries_reason() {
        let mut run = Run::with_id("r", "asdf", EngineConfig::default().routing_policy());
        run.outcome = RunOutcome::InvalidInput;
        let snapshot = StateSnapshot::seed("asdf")
            .merge(&StateDelta::new().set(StateValue::Validation(Validation::invalid("gibberish"))));
        let cp = Checkpoint::new(
            3,
            CheckpointKind::Sealed {
                outcome: RunOutcome::InvalidInput,
            },
            &run,
            &snapshot,
        );
        let report = RunReport::from_checkpoint(&cp);
        assert_eq!(report.outcome, RunOutcome::InvalidInput);
        assert_eq!(report.rejection_reason.as_deref(), Some("gibberish"));
        assert_eq!(report.history, RunHistory::None);
        assert_eq!(report.final_score, None);
        assert!(report.summary_line().starts_with("[INVALID_INPUT]"));
    }
}
