//! A stage that fans work out as long-running jobs and aggregates the results.

use super::Stage;
use crate::aggregate::{aggregate, AggregateResult};
use crate::capability::AsyncJobCapability;
use crate::context::{StageContext, StageInputs};
use crate::core::StageOutput;
use crate::errors::{CapabilityError, StageError};
use crate::events::EventKind;
use crate::poller::{JobPoller, JobSpec, PollBudget};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Turns stage inputs into a job spec and the aggregated result back into a value.
pub trait JobPlanner: Send + Sync {
    /// Builds the job spec for this invocation.
    fn plan(&self, inputs: &StageInputs) -> Result<JobSpec, CapabilityError>;

    /// Renders the aggregated result as the stage's output value.
    ///
    /// Defaults to the ordinal-sorted item list.
    fn render(&self, result: &AggregateResult) -> Result<serde_json::Value, CapabilityError> {
        serde_json::to_value(&result.items).map_err(|e| CapabilityError::Other(e.into()))
    }
}

/// Submits jobs through a [`JobPoller`] and aggregates whatever succeeded.
///
/// Ordinals that fail can be re-submitted up to `resubmit_rounds` times; each
/// round gets a fresh budget. The stage fails only when no ordinal produced an
/// item. Per-ordinal failures travel on the output so the run outcome can
/// report them.
pub struct JobStage {
    poller: JobPoller,
    planner: Arc<dyn JobPlanner>,
    budget: PollBudget,
    resubmit_rounds: u32,
}

impl JobStage {
    /// Creates a job stage with the default budget and no re-submission.
    #[must_use]
    pub fn new(capability: Arc<dyn AsyncJobCapability>, planner: Arc<dyn JobPlanner>) -> Self {
        Self {
            poller: JobPoller::new(capability),
            planner,
            budget: PollBudget::default(),
            resubmit_rounds: 0,
        }
    }

    /// Sets the poll budget.
    #[must_use]
    pub fn with_budget(mut self, budget: PollBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Sets how many times failed ordinals are re-submitted.
    #[must_use]
    pub fn with_resubmit_rounds(mut self, rounds: u32) -> Self {
        self.resubmit_rounds = rounds;
        self
    }
}

impl std::fmt::Debug for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobStage")
            .field("budget", &self.budget)
            .field("resubmit_rounds", &self.resubmit_rounds)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for JobStage {
    async fn run(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let spec = self.planner.plan(ctx.inputs())?;
        let cancel = ctx.cancel_token();

        let mut collected = AggregateResult::default();
        collected.absorb(self.poller.submit_and_await(&spec, &self.budget, cancel).await?);

        for round in 1..=self.resubmit_rounds {
            if collected.is_complete() {
                break;
            }
            let missing = collected.missing_ordinals();
            info!(stage = %ctx.stage_name(), round, ordinals = ?missing, "Re-submitting failed ordinals");
            let retry = spec.subset(&missing);
            collected.absorb(self.poller.submit_and_await(&retry, &self.budget, cancel).await?);
        }

        let result = aggregate(collected.items, collected.failures)?;
        let summary = result.summary();
        if result.is_complete() {
            info!(stage = %ctx.stage_name(), %summary, "Jobs aggregated");
        } else {
            warn!(stage = %ctx.stage_name(), %summary, missing = ?result.missing_ordinals(), "Jobs partially succeeded");
        }
        ctx.emit(
            EventKind::JobsAggregated,
            json!({
                "succeeded": summary.succeeded,
                "failed": summary.failed,
                "total": summary.total,
            }),
        );

        let value = self.planner.render(&result)?;
        Ok(StageOutput::with_failures(value, result.failures)
            .with_metadata("summary", json!(summary.to_string())))
    }
}
