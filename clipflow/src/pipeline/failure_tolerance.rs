//! Failure modes and the failure ledger of a run.

use crate::core::{FailureCause, JobFailureItem, Ordinal};
use crate::errors::StageError;
use crate::utils::{now, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How to handle stage failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Stop after the first failed group (default).
    #[default]
    FailFast,
    /// Record the failure and keep running later groups. Stages whose inputs
    /// were never produced because of it are skipped.
    ContinueOnFailure,
}

/// What kind of failure a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "cause")]
pub enum FailureKind {
    /// The stage itself failed.
    Stage,
    /// The stage was skipped because a producer of one of its inputs failed.
    UpstreamFailed,
    /// One ordinal of a job stage failed; the stage still produced a value.
    Job(FailureCause),
}

/// Record of one failure encountered during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Stage name.
    pub stage: String,
    /// Failure classification.
    pub kind: FailureKind,
    /// The failed ordinal, for job failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordinal: Option<Ordinal>,
    /// Error message.
    pub message: String,
    /// When the failure was recorded.
    pub timestamp: Timestamp,
}

impl FailureRecord {
    /// Records a failed stage.
    #[must_use]
    pub fn stage_failed(stage: impl Into<String>, error: &StageError) -> Self {
        Self {
            stage: stage.into(),
            kind: FailureKind::Stage,
            ordinal: None,
            message: error.to_string(),
            timestamp: now(),
        }
    }

    /// Records a skipped stage.
    #[must_use]
    pub fn upstream_failed(stage: impl Into<String>, key: &str, producer: &str) -> Self {
        Self {
            stage: stage.into(),
            kind: FailureKind::UpstreamFailed,
            ordinal: None,
            message: format!("input '{key}' was not produced because '{producer}' failed"),
            timestamp: now(),
        }
    }

    /// Records one failed ordinal of a job stage.
    #[must_use]
    pub fn job(stage: impl Into<String>, item: &JobFailureItem) -> Self {
        Self {
            stage: stage.into(),
            kind: FailureKind::Job(item.cause),
            ordinal: Some(item.ordinal),
            message: item.message.clone(),
            timestamp: item.timestamp,
        }
    }

    /// Returns true if the record is a per-ordinal job failure.
    #[must_use]
    pub fn is_job_failure(&self) -> bool {
        matches!(self.kind, FailureKind::Job(_))
    }
}

/// Collects failures during a run.
#[derive(Debug, Default)]
pub struct FailureCollector {
    records: Vec<FailureRecord>,
    failed_stages: HashSet<String>,
}

impl FailureCollector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failed stage.
    pub fn record_stage(&mut self, stage: &str, error: &StageError) {
        self.failed_stages.insert(stage.to_string());
        self.records.push(FailureRecord::stage_failed(stage, error));
    }

    /// Records a skipped stage. Skipped stages count as failed for their dependents.
    pub fn record_skip(&mut self, stage: &str, key: &str, producer: &str) {
        self.failed_stages.insert(stage.to_string());
        self.records.push(FailureRecord::upstream_failed(stage, key, producer));
    }

    /// Records per-ordinal failures of a stage that still succeeded.
    pub fn record_job_failures(&mut self, stage: &str, items: &[JobFailureItem]) {
        self.records
            .extend(items.iter().map(|item| FailureRecord::job(stage, item)));
    }

    /// Returns true if `stage` failed or was skipped.
    #[must_use]
    pub fn has_failed(&self, stage: &str) -> bool {
        self.failed_stages.contains(stage)
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns the records in the order they were recorded.
    #[must_use]
    pub fn records(&self) -> &[FailureRecord] {
        &self.records
    }

    /// Consumes the collector.
    #[must_use]
    pub fn into_records(self) -> Vec<FailureRecord> {
        self.records
    }
}
