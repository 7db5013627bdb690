//! Field names of the accumulated run state and checkpoint file naming.
//!
//! Every stage declares the [`StateKey`]s it reads and writes; the
//! orchestrator projects snapshots and checks deltas against these.

use serde::{Deserialize, Serialize};

/// One named field of a [`StateSnapshot`](super::StateSnapshot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKey {
    Idea,
    Validation,
    MarketResearch,
    CompetitorAnalysis,
    /// Devil's-advocate output of the legacy pivot loop.
    Critique,
    Debate,
    PivotHistory,
    Score,
    Report,
}

impl StateKey {
    pub fn all() -> &'static [StateKey] {
        &[
            StateKey::Idea,
            StateKey::Validation,
            StateKey::MarketResearch,
            StateKey::CompetitorAnalysis,
            StateKey::Critique,
            StateKey::Debate,
            StateKey::PivotHistory,
            StateKey::Score,
            StateKey::Report,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StateKey::Idea => "idea",
            StateKey::Validation => "validation",
            StateKey::MarketResearch => "market_research",
            StateKey::CompetitorAnalysis => "competitor_analysis",
            StateKey::Critique => "critique",
            StateKey::Debate => "debate",
            StateKey::PivotHistory => "pivot_history",
            StateKey::Score => "score",
            StateKey::Report => "report",
        }
    }

    /// Fields a pivot invalidates: everything derived from the previous idea.
    pub fn cleared_by_pivot() -> &'static [StateKey] {
        &[
            StateKey::MarketResearch,
            StateKey::CompetitorAnalysis,
            StateKey::Critique,
            StateKey::Score,
        ]
    }
}

impl std::fmt::Display for StateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File naming for the JSONL checkpoint backend.
pub mod files {
    /// Extension of a per-run checkpoint log.
    pub const CHECKPOINT_EXT: &str = "jsonl";

    /// File name holding the checkpoints of `run_id`.
    pub fn checkpoint_log(run_id: &str) -> String {
        format!("{}.{}", run_id, CHECKPOINT_EXT)
    }

    /// Recover the run id from a checkpoint log file name.
    pub fn parse_run_id(file_name: &str) -> Option<&str> {
        file_name
            .strip_suffix(CHECKPOINT_EXT)
            .and_then(|stem| stem.strip_suffix('.'))
            .filter(|stem| is_valid_run_id(stem))
    }

    /// Run ids become file names, so only a conservative alphabet is allowed.
    pub fn is_valid_run_id(run_id: &str) -> bool {
        !run_id.is_empty()
            && run_id.len() <= 128
            && run_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }
}
