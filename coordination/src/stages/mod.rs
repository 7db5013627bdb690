//! Stage Registry: the fixed catalog of stage functions.
//!
//! Each stage declares the [`StateKey`]s it reads and writes. The
//! orchestrator projects the snapshot down to `reads` before invoking it and
//! rejects any delta that touches a key outside `writes`.
//!
//! | Stage                 | Reads                                         | Writes            |
//! |-----------------------|-----------------------------------------------|-------------------|
//! | `validate_input`      | idea                                          | validation        |
//! | `market_research`     | idea                                          | market_research   |
//! | `competitor_analysis` | idea, market_research                         | competitor_analysis |
//! | `critique`            | idea, market_research, competitor_analysis, pivot_history | critique, score |
//! | `debate`              | idea, market_research, competitor_analysis    | debate, score     |
//! | `write_report`        | everything except validation                  | report            |

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{ControlMode, EngineConfig};
use crate::error::StageError;
use crate::state::{StateDelta, StateKey, StateSnapshot};

/// Identifier of a registered stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    ValidateInput,
    MarketResearch,
    CompetitorAnalysis,
    Critique,
    Debate,
    WriteReport,
}

impl StageId {
    pub fn all() -> &'static [StageId] {
        &[
            StageId::ValidateInput,
            StageId::MarketResearch,
            StageId::CompetitorAnalysis,
            StageId::Critique,
            StageId::Debate,
            StageId::WriteReport,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::ValidateInput => "validate_input",
            StageId::MarketResearch => "market_research",
            StageId::CompetitorAnalysis => "competitor_analysis",
            StageId::Critique => "critique",
            StageId::Debate => "debate",
            StageId::WriteReport => "write_report",
        }
    }

    /// Stages a control mode can route to.
    pub fn required_for(mode: ControlMode) -> &'static [StageId] {
        match mode {
            ControlMode::Debate => &[
                StageId::ValidateInput,
                StageId::MarketResearch,
                StageId::CompetitorAnalysis,
                StageId::Debate,
                StageId::WriteReport,
            ],
            ControlMode::LegacyPivot => &[
                StageId::ValidateInput,
                StageId::MarketResearch,
                StageId::CompetitorAnalysis,
                StageId::Critique,
                StageId::WriteReport,
            ],
        }
    }

    /// Declared read/write contract of this stage.
    pub fn spec(&self) -> StageSpec {
        use StateKey::*;
        match self {
            StageId::ValidateInput => StageSpec::new(&[Idea], &[Validation]),
            StageId::MarketResearch => StageSpec::new(&[Idea], &[MarketResearch]),
            StageId::CompetitorAnalysis => {
                StageSpec::new(&[Idea, MarketResearch], &[CompetitorAnalysis])
            }
            StageId::Critique => StageSpec::new(
                &[Idea, MarketResearch, CompetitorAnalysis, PivotHistory],
                &[Critique, Score],
            ),
            StageId::Debate => StageSpec::new(
                &[Idea, MarketResearch, CompetitorAnalysis],
                &[Debate, Score],
            ),
            StageId::WriteReport => StageSpec::new(
                &[
                    Idea,
                    MarketResearch,
                    CompetitorAnalysis,
                    Critique,
                    Debate,
                    PivotHistory,
                    Score,
                ],
                &[Report],
            ),
        }
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read/write contract of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSpec {
    pub reads: &'static [StateKey],
    pub writes: &'static [StateKey],
}

impl StageSpec {
    pub const fn new(reads: &'static [StateKey], writes: &'static [StateKey]) -> Self {
        Self { reads, writes }
    }

    /// Reject a delta that sets or clears an undeclared key.
    pub fn check_delta(&self, stage: StageId, delta: &StateDelta) -> Result<(), StageError> {
        match delta.touched_keys().find(|key| !self.writes.contains(key)) {
            Some(key) => Err(StageError::UndeclaredWrite { stage, key }),
            None => Ok(()),
        }
    }
}

/// A stage function.
///
/// `input` contains only the keys the stage declared in its `reads`. Any call
/// to the reasoning service must go through a governed client.
#[async_trait]
pub trait Stage: Send + Sync {
    async fn execute(
        &self,
        input: &StateSnapshot,
        config: &EngineConfig,
    ) -> Result<StateDelta, StageError>;
}

/// Catalog of stage implementations keyed by [`StageId`].
#[derive(Clone, Default)]
pub struct StageRegistry {
    stages: HashMap<StageId, Arc<dyn Stage>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the implementation of `id`.
    pub fn register(&mut self, id: StageId, stage: Arc<dyn Stage>) -> &mut Self {
        self.stages.insert(id, stage);
        self
    }

    pub fn with(mut self, id: StageId, stage: Arc<dyn Stage>) -> Self {
        self.stages.insert(id, stage);
        self
    }

    pub fn get(&self, id: StageId) -> Option<Arc<dyn Stage>> {
        self.stages.get(&id).cloned()
    }

    pub fn contains(&self, id: StageId) -> bool {
        self.stages.contains_key(&id)
    }

    /// Stages `mode` can route to that have no implementation.
    pub fn missing_for(&self, mode: ControlMode) -> Vec<StageId> {
        StageId::required_for(mode)
            .iter()
            .copied()
            .filter(|id| !self.contains(*id))
            .collect()
    }

    pub fn registered(&self) -> Vec<StageId> {
        let mut ids: Vec<StageId> = self.stages.keys().copied().collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRegistry")
            .field("stages", &self.registered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::Score;
    use crate::state::{StateValue, Validation};

    struct Noop;

    #[async_trait]
    impl Stage for Noop {
        async fn execute(
            &self,
            _input: &StateSnapshot,
            _config: &EngineConfig,
        ) -> Result<StateDelta, StageError> {
            Ok(StateDelta::new())
        }
    }

    #[test]
    fn test_every_stage_reads_idea() {
        for id in StageId::all() {
            assert!(id.spec().reads.contains(&StateKey::Idea), "{}", id);
        }
    }

    #[test]
    fn test_no_stage_writes_idea_or_history() {
        for id in StageId::all() {
            let writes = id.spec().writes;
            assert!(!writes.contains(&StateKey::Idea));
            assert!(!writes.contains(&StateKey::PivotHistory));
        }
    }

    #[test]
    fn test_check_delta_rejects_undeclared_write() {
        let spec = StageId::ValidateInput.spec();
        let ok = StateDelta::new().set(StateValue::Validation(Validation::valid()));
        assert!(spec.check_delta(StageId::ValidateInput, &ok).is_ok());

        let bad = ok.set(StateValue::Score(Score::clamped(9)));
        let err = spec.check_delta(StageId::ValidateInput, &bad).unwrap_err();
        assert!(matches!(
            err,
            StageError::UndeclaredWrite {
                key: StateKey::Score,
                ..
            }
        ));
    }

    #[test]
    fn test_check_delta_rejects_undeclared_clear() {
        let spec = StageId::Debate.spec();
        let bad = StateDelta::new().clear(StateKey::Validation);
        assert!(spec.check_delta(StageId::Debate, &bad).is_err());
    }

    #[test]
    fn test_missing_for_mode() {
        let registry = StageRegistry::new()
            .with(StageId::ValidateInput, Arc::new(Noop))
            .with(StageId::MarketResearch, Arc::new(Noop))
            .with(StageId::CompetitorAnalysis, Arc::new(Noop))
            .with(StageId::Debate, Arc::new(Noop))
            .with(StageId::WriteReport, Arc::new(Noop));

        assert!(registry.missing_for(ControlMode::Debate).is_empty());
        assert_eq!(
            registry.missing_for(ControlMode::LegacyPivot),
            vec![StageId::Critique]
        );
    }

    #[test]
    fn test_stage_id_serde_matches_display() {
        for id in StageId::all() {
            let json = serde_json::to_string(id).unwrap();
            assert_eq!(json, format!("\"{}\"", id));
        }
    }
}
