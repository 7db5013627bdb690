//! Orchestrator: drives a run from seed to sealed outcome.
//!
//! ```text
//!            ┌──────────────────────────────────────────────┐
//!            ▼                                              │
//! cancelled? ─► Router::decide ─┬─ Proceed(stage) ─► invoke ─► merge ─► checkpoint
//!                               ├─ Pivot(directive) ─► rewrite idea ─► checkpoint
//!                               └─ Terminate(outcome) ─► seal ─► RunReport
//! ```
//!
//! Every transition is persisted before the router is consulted again, so a
//! crash at any point resumes from the last completed stage.

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{EngineError, RetryCategory, StageError};
use crate::report::RunReport;
use crate::resilience::{retry_with_backoff, RetryExhausted};
use crate::router::{router_for, NextAction, PivotDirective};
use crate::stages::{StageId, StageRegistry};
use crate::state::{
    validate_checkpoint, Checkpoint, CheckpointKind, IntegrityStatus, PivotRecord, Run,
    RunFailure, SharedCheckpointStore, StateDelta, StateKey, StateSnapshot, StateValue,
};

/// The workflow engine.
///
/// Holds the stage catalog and the checkpoint store handle; owns no per-run
/// state between calls. Cancelling the token stops every run driven by this
/// engine at its next stage boundary.
pub struct Engine {
    config: EngineConfig,
    registry: StageRegistry,
    store: SharedCheckpointStore,
    cancel: CancellationToken,
}

impl Engine {
    /// Validate the configuration and check the registry covers the configured mode.
    pub fn new(
        config: EngineConfig,
        registry: StageRegistry,
        store: SharedCheckpointStore,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let missing = registry.missing_for(config.mode);
        if !missing.is_empty() {
            return Err(EngineError::IncompleteRegistry {
                mode: config.mode.to_string(),
                missing,
            });
        }
        Ok(Self {
            config,
            registry,
            store,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Evaluate a new idea under a fresh run id.
    pub async fn start(&self, idea: &str) -> Result<RunReport, EngineError> {
        self.start_with_id(&Uuid::new_v4().to_string(), idea).await
    }

    /// Evaluate a new idea under a caller-chosen run id.
    pub async fn start_with_id(&self, run_id: &str, idea: &str) -> Result<RunReport, EngineError> {
        if self.store.load_latest(run_id).await?.is_some() {
            return Err(EngineError::RunExists(run_id.to_string()));
        }
        let run = Run::with_id(run_id, idea, self.config.routing_policy());
        let snapshot = StateSnapshot::seed(idea);
        let created = self.persist(&run, &snapshot, 0, CheckpointKind::Created).await?;
        info!(run_id, mode = %run.policy.mode, "Run created");
        self.drive(created).await
    }

    /// Continue a run from its highest persisted checkpoint.
    ///
    /// A sealed run returns its stored report without executing anything.
    pub async fn resume(&self, run_id: &str) -> Result<RunReport, EngineError> {
        let latest = self.latest(run_id).await?;
        if latest.is_sealed() {
            debug!(run_id, outcome = %latest.run.outcome, "Run already sealed");
            return Ok(RunReport::from_checkpoint(&latest));
        }
        info!(run_id, sequence = latest.sequence, "Resuming run");
        self.drive(latest).await
    }

    pub async fn latest(&self, run_id: &str) -> Result<Checkpoint, EngineError> {
        self.store
            .load_latest(run_id)
            .await?
            .ok_or_else(|| EngineError::UnknownRun(run_id.to_string()))
    }

    pub async fn history(&self, run_id: &str) -> Result<Vec<Checkpoint>, EngineError> {
        Ok(self.store.history(run_id).await?)
    }

    pub async fn list_runs(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.store.list_runs().await?)
    }

    async fn drive(&self, from: Checkpoint) -> Result<RunReport, EngineError> {
        let run_id = from.run_id.clone();
        match validate_checkpoint(&from) {
            IntegrityStatus::Valid => {}
            IntegrityStatus::Recoverable { warnings } => {
                warn!(run_id = %run_id, ?warnings, "Resuming from checkpoint with warnings");
            }
            IntegrityStatus::Corrupted { errors } => {
                return Err(EngineError::Corrupted {
                    run_id,
                    reason: errors.join("; "),
                });
            }
        }

        let missing = self.registry.missing_for(from.run.policy.mode);
        if !missing.is_empty() {
            return Err(EngineError::IncompleteRegistry {
                mode: from.run.policy.mode.to_string(),
                missing,
            });
        }

        let span = info_span!("run", run_id = %run_id, mode = %from.run.policy.mode);
        self.drive_loop(from).instrument(span).await
    }

    async fn drive_loop(&self, from: Checkpoint) -> Result<RunReport, EngineError> {
        let Checkpoint {
            mut run,
            mut snapshot,
            mut sequence,
            ..
        } = from;
        let router = router_for(&run.policy);
        let ceiling = self.config.stage_invocation_ceiling(&run.policy);
        // Stages judge by the same frozen thresholds the router routes by.
        let config = self.config.with_policy(&run.policy);

        loop {
            if self.cancel.is_cancelled() {
                info!(sequence, "Run cancelled at stage boundary");
                return Err(EngineError::Cancelled {
                    run_id: run.run_id.clone(),
                });
            }

            let action = router
                .decide(&snapshot)
                .map_err(|source| EngineError::Router {
                    run_id: run.run_id.clone(),
                    source,
                })?;

            match action {
                NextAction::Proceed { stage } => {
                    if run.stage_invocations >= ceiling {
                        warn!(%stage, limit = ceiling, "Stage invocation ceiling reached");
                        let failure = RunFailure {
                            stage,
                            category: RetryCategory::Fatal,
                            message: format!("stage invocation ceiling of {} reached", ceiling),
                            attempts: 0,
                        };
                        // A run stuck at the ceiling keeps a single failure marker.
                        if run.failure.as_ref() != Some(&failure) {
                            run.mark_failed(failure);
                            self.persist(&run, &snapshot, sequence, CheckpointKind::Failed { stage })
                                .await?;
                        }
                        return Err(EngineError::InvocationCeiling {
                            run_id: run.run_id.clone(),
                            limit: ceiling,
                        });
                    }

                    match self.invoke(stage, &snapshot, &config).await? {
                        Ok(delta) => {
                            let next = snapshot.merge(&delta);
                            let mut next_run = run.clone();
                            next_run.stage_invocations += 1;
                            next_run.clear_failure();
                            next_run.touch();
                            let cp = self
                                .persist(
                                    &next_run,
                                    &next,
                                    sequence,
                                    CheckpointKind::StageCompleted { stage },
                                )
                                .await?;
                            info!(
                                %stage,
                                sequence = cp.sequence,
                                invocations = next_run.stage_invocations,
                                "Stage completed"
                            );
                            run = next_run;
                            snapshot = next;
                            sequence = cp.sequence;
                        }
                        Err(exhausted) => {
                            let RetryExhausted { attempts, last } = exhausted;
                            warn!(
                                %stage,
                                attempts,
                                category = %last.retry_category(),
                                error = %last,
                                "Stage failed, marking run resumable"
                            );
                            run.mark_failed(RunFailure {
                                stage,
                                category: last.retry_category(),
                                message: last.to_string(),
                                attempts,
                            });
                            self.persist(&run, &snapshot, sequence, CheckpointKind::Failed { stage })
                                .await?;
                            return Err(EngineError::StageFailed {
                                run_id: run.run_id.clone(),
                                stage,
                                attempts,
                                source: last,
                            });
                        }
                    }
                }
                NextAction::Pivot(directive) => {
                    let (next_run, next) = apply_pivot(&run, &snapshot, &directive);
                    let cp = self
                        .persist(
                            &next_run,
                            &next,
                            sequence,
                            CheckpointKind::Pivoted {
                                attempt: directive.attempt,
                            },
                        )
                        .await?;
                    info!(
                        attempt = directive.attempt,
                        score = directive.triggering_score.get(),
                        revised_idea = %directive.revised_idea,
                        "Pivoting"
                    );
                    run = next_run;
                    snapshot = next;
                    sequence = cp.sequence;
                }
                NextAction::Terminate { outcome } => {
                    let mut sealed = run.clone();
                    sealed.outcome = outcome;
                    sealed.failure = None;
                    sealed.touch();
                    let cp = self
                        .persist(&sealed, &snapshot, sequence, CheckpointKind::Sealed { outcome })
                        .await?;
                    info!(%outcome, sequence = cp.sequence, "Run sealed");
                    return Ok(RunReport::from_checkpoint(&cp));
                }
            }
        }
    }

    /// Run one stage with timeout and retry.
    ///
    /// The outer error is an engine fault; the inner one a stage failure.
    async fn invoke(
        &self,
        stage: StageId,
        snapshot: &StateSnapshot,
        config: &EngineConfig,
    ) -> Result<Result<StateDelta, RetryExhausted>, EngineError> {
        let handler = self
            .registry
            .get(stage)
            .ok_or(EngineError::UnregisteredStage(stage))?;
        let spec = stage.spec();
        let input = snapshot.project(spec.reads);
        let timeout = config.stage_timeout(stage);
        let input = &input;

        let result = retry_with_backoff(&config.retry_policy(), |attempt| {
            let handler = handler.clone();
            async move {
                debug!(%stage, attempt, "Invoking stage");
                let delta = match tokio::time::timeout(timeout, handler.execute(input, config)).await
                {
                    Ok(result) => result?,
                    Err(_) => {
                        return Err(StageError::Timeout {
                            stage,
                            after: timeout,
                        })
                    }
                };
                spec.check_delta(stage, &delta)?;
                Ok(delta)
            }
        })
        .await;
        Ok(result)
    }

    async fn persist(
        &self,
        run: &Run,
        snapshot: &StateSnapshot,
        after: u64,
        kind: CheckpointKind,
    ) -> Result<Checkpoint, EngineError> {
        let checkpoint = Checkpoint::new(after + 1, kind, run, snapshot);
        self.store.append(&run.run_id, &checkpoint).await?;
        debug!(sequence = checkpoint.sequence, %kind, "Checkpoint persisted");
        Ok(checkpoint)
    }
}

/// Rewrite the idea, record the pivot and drop everything derived from the old idea.
fn apply_pivot(run: &Run, snapshot: &StateSnapshot, directive: &PivotDirective) -> (Run, StateSnapshot) {
    let mut history = snapshot.pivot_history().to_vec();
    history.push(PivotRecord {
        attempt: directive.attempt,
        prior_idea: run.current_idea.clone(),
        revised_idea: directive.revised_idea.clone(),
        triggering_score: directive.triggering_score,
        rationale: directive.reason.clone(),
        timestamp: Utc::now(),
    });

    let delta = StateKey::cleared_by_pivot()
        .iter()
        .fold(StateDelta::new(), |delta, key| delta.clear(*key))
        .set(StateValue::Idea(directive.revised_idea.clone()))
        .set(StateValue::PivotHistory(history));

    let mut next_run = run.clone();
    next_run.current_idea = directive.revised_idea.clone();
    next_run.pivot_attempts = directive.attempt;
    next_run.touch();
    (next_run, snapshot.merge(&delta))
}
