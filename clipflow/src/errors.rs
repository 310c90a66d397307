//! Error types for clipflow.
//!
//! The taxonomy follows the failure model of the engine: configuration errors
//! (`MissingDependency`, validation) are fatal and never retried, capability
//! errors surface as `StageFailed`, poller problems are isolated per ordinal and
//! only become errors when nothing at all succeeded.

use crate::core::JobFailureItem;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The crate-wide error type.
#[derive(Debug, Error)]
pub enum ClipflowError {
    /// Pipeline construction was rejected.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// A pipeline run failed.
    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    /// The job poller refused or abandoned work.
    #[error("{0}")]
    Poller(#[from] PollerError),

    /// Every ordinal of a job batch failed.
    #[error("{0}")]
    Aggregate(#[from] AggregateError),

    /// An external capability failed.
    #[error("{0}")]
    Capability(#[from] CapabilityError),

    /// Configuration could not be loaded or is invalid.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A shared state key was written by a stage that does not own it.
    #[error("{0}")]
    StateConflict(#[from] StateConflictError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Metadata about a contract violation for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "CONTRACT-DUPLICATE-STAGE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when a pipeline declaration is structurally invalid.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the contract code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// Error raised when a shared state key is written by a stage that does not own it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("State conflict: key '{key}' is owned by '{owner}' and cannot be written by '{writer}'")]
pub struct StateConflictError {
    /// The conflicting key.
    pub key: String,
    /// The stage that produced the key first.
    pub owner: String,
    /// The stage that attempted the write.
    pub writer: String,
}

impl StateConflictError {
    /// Creates a new state conflict error.
    #[must_use]
    pub fn new(key: impl Into<String>, owner: impl Into<String>, writer: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            owner: owner.into(),
            writer: writer.into(),
        }
    }
}

/// Error raised when a stage reads a key it did not declare as an input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Undeclared input: stage '{stage}' attempted to read '{key}' which was not declared as an input")]
pub struct UndeclaredInputError {
    /// The stage attempting access.
    pub stage: String,
    /// The undeclared key.
    pub key: String,
}

impl UndeclaredInputError {
    /// Creates a new undeclared input error.
    #[must_use]
    pub fn new(stage: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            key: key.into(),
        }
    }
}

/// Errors returned by external capabilities (generation APIs, job services, asset stores).
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// The service rejected the request.
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// The service could not be reached or answered with a transport failure.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// The service answered with something the caller cannot use.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// A required input value was absent.
    #[error("Missing input '{0}'")]
    MissingInput(String),

    /// An input value had the wrong shape.
    #[error("Invalid input '{key}': {reason}")]
    InvalidInput {
        /// The input key.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// An asset handle did not resolve.
    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    /// The stage read an input it never declared.
    #[error("{0}")]
    Undeclared(#[from] UndeclaredInputError),

    /// Any other failure raised by the implementation.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CapabilityError {
    /// Creates an invalid input error.
    #[must_use]
    pub fn invalid_input(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Returns true for transient failures worth another attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Errors returned by a single stage invocation.
#[derive(Debug, Error)]
pub enum StageError {
    /// The external capability failed.
    #[error("capability error: {0}")]
    Capability(#[from] CapabilityError),

    /// A job stage produced no usable item at all.
    #[error("{0}")]
    Aggregate(#[from] AggregateError),

    /// The poller rejected the job request.
    #[error("{0}")]
    Poller(PollerError),

    /// The stage observed cancellation.
    #[error("Stage cancelled: {0}")]
    Cancelled(String),

    /// The stage could not interpret its inputs.
    #[error("Invalid stage input: {0}")]
    InvalidInput(String),
}

impl StageError {
    /// Returns true if this failure must abort the whole run regardless of failure mode.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Aggregate(_))
    }
}

impl From<PollerError> for StageError {
    fn from(err: PollerError) -> Self {
        match err {
            PollerError::Cancelled(reason) => Self::Cancelled(reason),
            other => Self::Poller(other),
        }
    }
}

/// A single failing member of a stage group.
#[derive(Debug, Error)]
#[error("{stage}: {cause}")]
pub struct MemberFailure {
    /// The failing stage.
    pub stage: String,
    /// The underlying cause.
    #[source]
    pub cause: StageError,
}

/// Errors that end (or describe the failure of) a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A stage's required input key was absent when its group was about to run.
    #[error("Missing dependency: stage '{stage}' requires '{key}' which is not in shared state")]
    MissingDependency {
        /// The stage that declared the input.
        stage: String,
        /// The missing key.
        key: String,
    },

    /// A stage of a sequential group failed.
    #[error("Stage '{stage}' failed: {cause}")]
    StageFailed {
        /// The failing stage.
        stage: String,
        /// The underlying cause.
        #[source]
        cause: StageError,
    },

    /// One or more members of a parallel group failed.
    #[error("Group '{group}' failed: {}", describe_members(.failures))]
    GroupFailed {
        /// The group name.
        group: String,
        /// Every failing member, in declared order.
        failures: Vec<MemberFailure>,
    },

    /// The run was cancelled (explicitly or by its deadline).
    #[error("Pipeline cancelled: {reason}")]
    Cancelled {
        /// The cancellation reason.
        reason: String,
    },

    /// A merge violated key ownership.
    #[error("{0}")]
    StateConflict(#[from] StateConflictError),
}

impl PipelineError {
    /// Returns true for configuration errors.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::MissingDependency { .. } | Self::StateConflict(_))
    }

    /// Returns true if the run was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Returns the names of the stages that failed.
    #[must_use]
    pub fn failed_stages(&self) -> Vec<&str> {
        match self {
            Self::MissingDependency { stage, .. } | Self::StageFailed { stage, .. } => vec![stage],
            Self::GroupFailed { failures, .. } => failures.iter().map(|f| f.stage.as_str()).collect(),
            Self::Cancelled { .. } | Self::StateConflict(_) => Vec::new(),
        }
    }
}

fn describe_members(failures: &[MemberFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors returned by the job poller itself (per-ordinal problems are failure items, not errors).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollerError {
    /// Polling stopped because the run was cancelled.
    #[error("Polling cancelled: {0}")]
    Cancelled(String),

    /// The poll budget cannot be honoured.
    #[error("Invalid poll budget: {0}")]
    InvalidBudget(String),

    /// The job spec is empty or malformed.
    #[error("Invalid job spec: {0}")]
    InvalidSpec(String),
}

/// Error raised when a batch produced failures and no successful item.
#[derive(Debug, Clone, Error)]
#[error("All {} ordinal(s) failed: {}", .failures.len(), describe_failures(.failures))]
pub struct AggregateError {
    /// Every failure, ordinal-sorted.
    pub failures: Vec<JobFailureItem>,
}

impl AggregateError {
    /// Creates a new aggregate error.
    #[must_use]
    pub fn new(failures: Vec<JobFailureItem>) -> Self {
        Self { failures }
    }
}

fn describe_failures(failures: &[JobFailureItem]) -> String {
    failures
        .iter()
        .map(|f| format!("#{} {} ({})", f.ordinal, f.cause, f.message))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value is out of range or inconsistent.
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// The configuration file could not be read.
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FailureCause;

    #[test]
    fn test_contract_error_info_creation() {
        let info = ContractErrorInfo::new("CONTRACT-DUPLICATE-STAGE", "Duplicate stage")
            .with_fix_hint("Rename one of the stages")
            .with_context_entry("stage", "ScriptGenerator");

        assert_eq!(info.code, "CONTRACT-DUPLICATE-STAGE");
        assert_eq!(info.fix_hint.as_deref(), Some("Rename one of the stages"));
        assert_eq!(info.context.get("stage").map(String::as_str), Some("ScriptGenerator"));
    }

    #[test]
    fn test_validation_error_code() {
        let err = PipelineValidationError::new("bad")
            .with_error_info(ContractErrorInfo::new("CONTRACT-EMPTY", "empty"));
        assert_eq!(err.code(), Some("CONTRACT-EMPTY"));
        assert_eq!(PipelineValidationError::new("bad").code(), None);
    }

    #[test]
    fn test_missing_dependency_message() {
        let err = PipelineError::MissingDependency {
            stage: "ImageCreator".to_string(),
            key: "prompts_data".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("ImageCreator"));
        assert!(msg.contains("prompts_data"));
        assert!(err.is_configuration());
        assert_eq!(err.failed_stages(), vec!["ImageCreator"]);
    }

    #[test]
    fn test_group_failed_lists_members() {
        let err = PipelineError::GroupFailed {
            group: "ParallelProcessing".to_string(),
            failures: vec![
                MemberFailure {
                    stage: "AudioNarrator".to_string(),
                    cause: StageError::Capability(CapabilityError::Unavailable("tts down".into())),
                },
                MemberFailure {
                    stage: "PromptGenerator".to_string(),
                    cause: StageError::InvalidInput("no script".into()),
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("AudioNarrator"));
        assert!(msg.contains("tts down"));
        assert!(msg.contains("PromptGenerator"));
        assert_eq!(err.failed_stages(), vec!["AudioNarrator", "PromptGenerator"]);
    }

    #[test]
    fn test_poller_cancellation_maps_to_stage_cancellation() {
        let err: StageError = PollerError::Cancelled("abort".into()).into();
        assert!(matches!(err, StageError::Cancelled(ref r) if r == "abort"));

        let err: StageError = PollerError::InvalidSpec("empty".into()).into();
        assert!(matches!(err, StageError::Poller(_)));
    }

    #[test]
    fn test_aggregate_error_is_fatal() {
        let err = StageError::from(AggregateError::new(vec![JobFailureItem::new(
            0,
            FailureCause::Timeout,
            "timed out",
        )]));
        assert!(err.is_fatal());
        assert!(err.to_string().contains("#0 timeout"));
        assert!(!StageError::InvalidInput("x".into()).is_fatal());
    }
}
