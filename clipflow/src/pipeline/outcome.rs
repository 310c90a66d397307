//! The result of one pipeline run.

use super::{FailureKind, FailureRecord};
use crate::context::{FinalState, RunIdentity};
use crate::errors::PipelineError;
use serde::{Serialize, Serializer};
use std::fmt;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every group ran and nothing failed.
    Completed,
    /// Every group ran (or was skipped) but some failures were recorded.
    CompletedWithFailures,
    /// The run stopped on an error.
    Failed,
    /// The run was cancelled.
    Cancelled,
}

impl RunStatus {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::CompletedWithFailures => "completed_with_failures",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a caller gets back from [`crate::pipeline::Pipeline::run`].
///
/// `state` is always the best-effort shared state: on failure or cancellation
/// it holds the outputs of the groups that completed.
#[derive(Debug, Serialize)]
pub struct PipelineOutcome {
    /// Identity of the run.
    pub run: RunIdentity,
    /// How the run ended.
    pub status: RunStatus,
    /// Final shared state.
    pub state: FinalState,
    /// Every failure encountered, including per-ordinal job failures.
    pub failures: Vec<FailureRecord>,
    /// The error that ended the run, if any.
    #[serde(serialize_with = "serialize_error", skip_serializing_if = "Option::is_none")]
    pub error: Option<PipelineError>,
    /// Groups that completed, in order.
    pub completed_groups: Vec<String>,
    /// Wall time of the run.
    pub duration_ms: u64,
}

#[allow(clippy::ref_option)]
fn serialize_error<S: Serializer>(error: &Option<PipelineError>, serializer: S) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_str(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

impl PipelineOutcome {
    /// Returns true if the run reached the end.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.status, RunStatus::Completed | RunStatus::CompletedWithFailures)
    }

    /// Returns the per-ordinal job failures.
    pub fn job_failures(&self) -> impl Iterator<Item = &FailureRecord> {
        self.failures.iter().filter(|f| f.is_job_failure())
    }

    /// Returns the stages that failed or were skipped.
    #[must_use]
    pub fn failed_stages(&self) -> Vec<&str> {
        self.failures
            .iter()
            .filter(|f| matches!(f.kind, FailureKind::Stage | FailureKind::UpstreamFailed))
            .map(|f| f.stage.as_str())
            .collect()
    }

    /// Converts the outcome into the final state or the error that ended the run.
    ///
    /// # Errors
    ///
    /// Returns the run's `PipelineError` if it failed or was cancelled.
    pub fn into_result(self) -> Result<FinalState, PipelineError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.state),
        }
    }
}
