//! Group-by-group pipeline execution.

use super::{
    FailureCollector, FailureMode, PipelineBuilder, PipelineDescription, PipelineOutcome,
    RunStatus, StageDescriptor, StageGroup,
};
use crate::cancellation::CancellationToken;
use crate::capability::AssetStore;
use crate::context::{
    RunIdentity, SharedState, StageContext, StageInputs, StateSnapshot, StateWrite, RESERVED_INPUT_KEY,
};
use crate::core::StageOutput;
use crate::errors::{CapabilityError, MemberFailure, PipelineError, StageError};
use crate::events::{EventKind, EventSink, PipelineEvent};
use crate::utils::duration_ms;
use indexmap::IndexMap;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// A validated pipeline: ordered stage groups plus run-level settings.
///
/// Built with [`PipelineBuilder`]. A pipeline is immutable and can be run any
/// number of times; each run owns its own shared state.
#[derive(Clone)]
pub struct Pipeline {
    pub(super) name: String,
    pub(super) groups: Vec<StageGroup>,
    pub(super) failure_mode: FailureMode,
    pub(super) events: Arc<dyn EventSink>,
    pub(super) assets: Arc<dyn AssetStore>,
    pub(super) run_deadline: Option<Duration>,
    /// Output key to producing stage.
    pub(super) producers: IndexMap<String, String>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("groups", &self.groups)
            .field("failure_mode", &self.failure_mode)
            .field("run_deadline", &self.run_deadline)
            .finish_non_exhaustive()
    }
}

enum Readiness {
    Ready,
    Skip { key: String, producer: String },
    Missing { key: String },
}

impl Pipeline {
    /// Starts building a pipeline.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder::new(name)
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the groups in execution order.
    #[must_use]
    pub fn groups(&self) -> &[StageGroup] {
        &self.groups
    }

    /// Returns the failure mode.
    #[must_use]
    pub const fn failure_mode(&self) -> FailureMode {
        self.failure_mode
    }

    /// Returns the run deadline, if any.
    #[must_use]
    pub const fn run_deadline(&self) -> Option<Duration> {
        self.run_deadline
    }

    /// Returns the stage that produces `key`.
    #[must_use]
    pub fn producer_of(&self, key: &str) -> Option<&str> {
        self.producers.get(key).map(String::as_str)
    }

    /// Returns a serializable summary of groups, stages, inputs and outputs.
    #[must_use]
    pub fn describe(&self) -> PipelineDescription {
        PipelineDescription {
            name: self.name.clone(),
            groups: self.groups.iter().map(StageGroup::describe).collect(),
        }
    }

    /// Walks the groups without running anything and reports the first input
    /// key that would not be available when its stage is reached.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::MissingDependency` for the first unmet input.
    pub fn check_dependencies(&self) -> Result<(), PipelineError> {
        let mut available: HashSet<&str> = HashSet::from([RESERVED_INPUT_KEY]);

        for group in &self.groups {
            let mut produced = Vec::new();
            for stage in group.stages() {
                if let Some(key) = stage.inputs.iter().find(|k| !available.contains(k.as_str())) {
                    return Err(PipelineError::MissingDependency {
                        stage: stage.name.clone(),
                        key: key.clone(),
                    });
                }
                if group.is_parallel() {
                    produced.push(stage.output.as_str());
                } else {
                    available.insert(stage.output.as_str());
                }
            }
            available.extend(produced);
        }
        Ok(())
    }

    /// Runs the pipeline for a topic with a fresh cancellation token.
    pub async fn run_topic(&self, topic: &str) -> PipelineOutcome {
        self.run(json!(topic), Arc::new(CancellationToken::new())).await
    }

    /// Runs the pipeline once.
    ///
    /// The input is stored under the reserved `topic` key before the first
    /// group. Cancelling `cancel` stops the run at the next suspension point;
    /// the run deadline, if set, cancels the same token.
    pub async fn run(&self, input: serde_json::Value, cancel: Arc<CancellationToken>) -> PipelineOutcome {
        let run = RunIdentity::new().with_pipeline(&self.name);
        self.run_with_identity(run, input, cancel).await
    }

    /// Runs the pipeline under a caller-provided identity.
    pub async fn run_with_identity(
        &self,
        run: RunIdentity,
        input: serde_json::Value,
        cancel: Arc<CancellationToken>,
    ) -> PipelineOutcome {
        let span = info_span!("pipeline_run", pipeline = %self.name, run_id = %run.run_id);
        self.execute(run, input, cancel).instrument(span).await
    }

    async fn execute(
        &self,
        run: RunIdentity,
        input: serde_json::Value,
        cancel: Arc<CancellationToken>,
    ) -> PipelineOutcome {
        let started = Instant::now();
        let deadline_timer = self
            .run_deadline
            .map(|deadline| cancel.cancel_after(deadline, "deadline exceeded"));

        let mut state = SharedState::with_input(input);
        let mut failures = FailureCollector::new();
        let mut completed_groups = Vec::new();
        let mut error: Option<PipelineError> = None;

        info!(groups = self.groups.len(), mode = ?self.failure_mode, "Pipeline started");
        self.emit(
            &run,
            EventKind::PipelineStarted,
            json!({ "pipeline": self.name, "groups": self.groups.len() }),
        );

        for group in &self.groups {
            if cancel.is_cancelled() {
                error = Some(PipelineError::Cancelled {
                    reason: cancel.reason_or_default(),
                });
                break;
            }

            let member_names: Vec<&str> = group.stages().iter().map(|s| s.name.as_str()).collect();
            debug!(group = %group.name(), mode = group.mode(), "Group started");
            self.emit(
                &run,
                EventKind::GroupStarted,
                json!({ "group": group.name(), "mode": group.mode(), "stages": member_names }),
            );

            let result = match group {
                StageGroup::Sequential { stages, .. } => {
                    self.run_sequential(stages, &run, &cancel, &mut state, &mut failures).await
                }
                StageGroup::Parallel { name, stages } => {
                    self.run_parallel(name, stages, &run, &cancel, &mut state, &mut failures)
                        .await
                }
            };

            match result {
                Ok(()) => {
                    completed_groups.push(group.name().to_string());
                    self.emit(
                        &run,
                        EventKind::GroupCompleted,
                        json!({ "group": group.name(), "status": "completed" }),
                    );
                }
                Err(err) if self.failure_mode == FailureMode::ContinueOnFailure && !halts_run(&err) => {
                    warn!(group = %group.name(), error = %err, "Group failed, continuing");
                    self.emit(
                        &run,
                        EventKind::GroupCompleted,
                        json!({ "group": group.name(), "status": "failed", "error": err.to_string() }),
                    );
                }
                Err(err) => {
                    error = Some(err);
                    break;
                }
            }
        }

        if let Some(timer) = deadline_timer {
            timer.abort();
        }

        let status = match &error {
            Some(PipelineError::Cancelled { .. }) => RunStatus::Cancelled,
            Some(_) => RunStatus::Failed,
            None if failures.is_empty() => RunStatus::Completed,
            None => RunStatus::CompletedWithFailures,
        };
        let elapsed = duration_ms(started.elapsed());

        match &error {
            Some(PipelineError::Cancelled { reason }) => {
                warn!(reason = %reason, completed = completed_groups.len(), "Pipeline cancelled");
                self.emit(
                    &run,
                    EventKind::PipelineCancelled,
                    json!({ "reason": reason, "completed_groups": completed_groups, "duration_ms": elapsed }),
                );
            }
            other => {
                match other {
                    Some(err) => error!(error = %err, "Pipeline failed"),
                    None => info!(status = %status, failures = failures.len(), duration_ms = elapsed, "Pipeline completed"),
                }
                self.emit(
                    &run,
                    EventKind::PipelineCompleted,
                    json!({
                        "status": status,
                        "failures": failures.len(),
                        "completed_groups": completed_groups,
                        "duration_ms": elapsed,
                        "error": other.as_ref().map(ToString::to_string),
                    }),
                );
            }
        }

        PipelineOutcome {
            run,
            status,
            state,
            failures: failures.into_records(),
            error,
            completed_groups,
            duration_ms: elapsed,
        }
    }

    async fn run_sequential(
        &self,
        stages: &[StageDescriptor],
        run: &RunIdentity,
        cancel: &Arc<CancellationToken>,
        state: &mut SharedState,
        failures: &mut FailureCollector,
    ) -> Result<(), PipelineError> {
        // Members may read the outputs of earlier members of the same group.
        let mut planned: HashSet<&str> = HashSet::new();
        for stage in stages {
            let has_key = |key: &str| state.contains_key(key) || planned.contains(key);
            if let Readiness::Missing { key } = self.readiness(stage, has_key, failures) {
                return Err(missing(stage, key));
            }
            planned.insert(stage.output.as_str());
        }

        let mut pending: Vec<StateWrite> = Vec::new();
        let mut group_error = None;

        for stage in stages {
            let has_key = |key: &str| state.contains_key(key) || pending.iter().any(|w| w.key == key);
            match self.readiness(stage, has_key, failures) {
                Readiness::Ready => {}
                Readiness::Skip { key, producer } => {
                    self.skip(stage, &key, &producer, run, failures);
                    continue;
                }
                Readiness::Missing { key } => return Err(missing(stage, key)),
            }

            let ctx = self.stage_context(stage, state.snapshot_with(&pending), run, cancel);
            match invoke_stage(stage, &ctx).await {
                Ok(output) => {
                    failures.record_job_failures(&stage.name, &output.failures);
                    pending.push(StateWrite::new(&stage.name, &stage.output, output.value));
                }
                Err(StageError::Cancelled(reason)) => return Err(PipelineError::Cancelled { reason }),
                Err(cause) => {
                    failures.record_stage(&stage.name, &cause);
                    let halt = cause.is_fatal() || self.failure_mode == FailureMode::FailFast;
                    let err = PipelineError::StageFailed {
                        stage: stage.name.clone(),
                        cause,
                    };
                    if halt {
                        state.merge_all(pending)?;
                        return Err(err);
                    }
                    group_error.get_or_insert(err);
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled {
                reason: cancel.reason_or_default(),
            });
        }

        state.merge_all(pending)?;
        group_error.map_or(Ok(()), Err)
    }

    async fn run_parallel(
        &self,
        group: &str,
        stages: &[StageDescriptor],
        run: &RunIdentity,
        cancel: &Arc<CancellationToken>,
        state: &mut SharedState,
        failures: &mut FailureCollector,
    ) -> Result<(), PipelineError> {
        let mut ready = Vec::with_capacity(stages.len());
        let mut skipped = Vec::new();
        for stage in stages {
            match self.readiness(stage, |key| state.contains_key(key), failures) {
                Readiness::Ready => ready.push(stage),
                Readiness::Skip { key, producer } => skipped.push((stage, key, producer)),
                Readiness::Missing { key } => return Err(missing(stage, key)),
            }
        }
        for (stage, key, producer) in skipped {
            self.skip(stage, &key, &producer, run, failures);
        }

        let snapshot = state.snapshot();
        let mut members = MemberTasks(
            ready
                .iter()
                .map(|stage| {
                    let descriptor = (*stage).clone();
                    let ctx = self.stage_context(stage, snapshot.clone(), run, cancel);
                    tokio::spawn(async move { invoke_stage(&descriptor, &ctx).await })
                })
                .collect(),
        );

        let joined = futures::future::join_all(members.0.iter_mut()).await;
        let results: Vec<(&StageDescriptor, Result<StageOutput, StageError>)> = ready
            .into_iter()
            .zip(joined)
            .map(|(stage, joined)| {
                let result = joined.unwrap_or_else(|e| {
                    Err(StageError::Capability(CapabilityError::Other(anyhow::anyhow!(
                        "stage task failed: {e}"
                    ))))
                });
                (stage, result)
            })
            .collect();

        let cancelled = results.iter().find_map(|(_, result)| match result {
            Err(StageError::Cancelled(reason)) => Some(reason.clone()),
            _ => None,
        });
        if let Some(reason) = cancelled {
            return Err(PipelineError::Cancelled { reason });
        }
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled {
                reason: cancel.reason_or_default(),
            });
        }

        let mut member_failures = Vec::new();
        for (stage, result) in results {
            match result {
                Ok(output) => {
                    failures.record_job_failures(&stage.name, &output.failures);
                    state.merge(&stage.name, &stage.output, output.value)?;
                }
                Err(cause) => {
                    failures.record_stage(&stage.name, &cause);
                    member_failures.push(MemberFailure {
                        stage: stage.name.clone(),
                        cause,
                    });
                }
            }
        }

        if member_failures.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::GroupFailed {
                group: group.to_string(),
                failures: member_failures,
            })
        }
    }

    fn readiness(
        &self,
        stage: &StageDescriptor,
        has_key: impl Fn(&str) -> bool,
        failures: &FailureCollector,
    ) -> Readiness {
        for key in &stage.inputs {
            if has_key(key) {
                continue;
            }
            if self.failure_mode == FailureMode::ContinueOnFailure {
                if let Some(producer) = self.producers.get(key) {
                    if failures.has_failed(producer) {
                        return Readiness::Skip {
                            key: key.clone(),
                            producer: producer.clone(),
                        };
                    }
                }
            }
            return Readiness::Missing { key: key.clone() };
        }
        Readiness::Ready
    }

    fn skip(
        &self,
        stage: &StageDescriptor,
        key: &str,
        producer: &str,
        run: &RunIdentity,
        failures: &mut FailureCollector,
    ) {
        warn!(stage = %stage.name, key, producer, "Skipping stage, upstream producer failed");
        failures.record_skip(&stage.name, key, producer);
        self.emit(
            run,
            EventKind::StageSkipped,
            json!({ "stage": stage.name, "key": key, "producer": producer }),
        );
    }

    fn stage_context(
        &self,
        stage: &StageDescriptor,
        snapshot: StateSnapshot,
        run: &RunIdentity,
        cancel: &Arc<CancellationToken>,
    ) -> StageContext {
        StageContext::new(
            &stage.name,
            run.clone(),
            StageInputs::new(snapshot, stage.inputs.clone(), &stage.name),
            Arc::clone(cancel),
            Arc::clone(&self.assets),
            Arc::clone(&self.events),
        )
    }

    fn emit(&self, run: &RunIdentity, kind: EventKind, data: serde_json::Value) {
        self.events.emit(PipelineEvent::new(kind, run.run_id).with_data(data));
    }
}

/// Runs one stage, racing it against cancellation.
async fn invoke_stage(stage: &StageDescriptor, ctx: &StageContext) -> Result<StageOutput, StageError> {
    let started = Instant::now();
    debug!(stage = %stage.name, "Stage started");
    ctx.emit(EventKind::StageStarted, json!({ "output": stage.output }));

    let token = ctx.cancel_token();
    let result = tokio::select! {
        biased;
        () = token.cancelled() => Err(StageError::Cancelled(token.reason_or_default())),
        result = stage.stage.run(ctx) => result,
    };
    let elapsed = duration_ms(started.elapsed());

    match &result {
        Ok(output) => {
            info!(stage = %stage.name, duration_ms = elapsed, partial = output.is_partial(), "Stage completed");
            ctx.emit(
                EventKind::StageCompleted,
                json!({ "duration_ms": elapsed, "partial": output.is_partial() }),
            );
        }
        Err(err) => {
            let cancelled = matches!(err, StageError::Cancelled(_));
            if cancelled {
                warn!(stage = %stage.name, error = %err, "Stage cancelled");
            } else {
                error!(stage = %stage.name, error = %err, "Stage failed");
            }
            ctx.emit(
                EventKind::StageFailed,
                json!({ "duration_ms": elapsed, "error": err.to_string(), "cancelled": cancelled }),
            );
        }
    }
    result
}

fn missing(stage: &StageDescriptor, key: String) -> PipelineError {
    PipelineError::MissingDependency {
        stage: stage.name.clone(),
        key,
    }
}

/// Spawned parallel members, aborted if the run is dropped before they finish.
struct MemberTasks(Vec<JoinHandle<Result<StageOutput, StageError>>>);

impl Drop for MemberTasks {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Errors that end the run even under `ContinueOnFailure`.
fn halts_run(error: &PipelineError) -> bool {
    match error {
        PipelineError::StageFailed { cause, .. } => cause.is_fatal(),
        PipelineError::GroupFailed { failures, .. } => failures.iter().any(|f| f.cause.is_fatal()),
        PipelineError::MissingDependency { .. }
        | PipelineError::Cancelled { .. }
        | PipelineError::StateConflict(_) => true,
    }
}
