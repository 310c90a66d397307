//! Per-ordinal outcomes of a long-running job.

use super::{AssetHandle, Ordinal};
use crate::utils::{now, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Why an ordinal produced no result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    /// The submission call for the job was rejected.
    SubmissionFailed,
    /// Polling kept failing at the transport level past the retry limit.
    TransportFailed,
    /// The service reported the job (or this ordinal) as failed.
    TerminalFailure,
    /// The job finished but the response did not mention this ordinal.
    MissingInResponse,
    /// The poll budget ran out before the job reached a terminal state.
    Timeout,
}

impl FailureCause {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SubmissionFailed => "submission_failed",
            Self::TransportFailed => "transport_failed",
            Self::TerminalFailure => "terminal_failure",
            Self::MissingInResponse => "missing_in_response",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A successful per-ordinal result. Only produced on terminal success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResultItem {
    /// Position within the originating job spec.
    pub ordinal: Ordinal,
    /// Where the produced asset lives.
    pub asset: AssetHandle,
    /// MIME type of the asset, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Free-form metadata reported by the service.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl JobResultItem {
    /// Creates a new result item.
    #[must_use]
    pub fn new(ordinal: Ordinal, asset: AssetHandle) -> Self {
        Self {
            ordinal,
            asset,
            mime_type: None,
            metadata: HashMap::new(),
        }
    }

    /// Sets the MIME type.
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A per-ordinal failure. Never aborts sibling ordinals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailureItem {
    /// Position within the originating job spec.
    pub ordinal: Ordinal,
    /// Failure classification.
    pub cause: FailureCause,
    /// Human-readable detail.
    pub message: String,
    /// When the failure was recorded.
    pub timestamp: Timestamp,
}

impl JobFailureItem {
    /// Creates a new failure item stamped with the current time.
    #[must_use]
    pub fn new(ordinal: Ordinal, cause: FailureCause, message: impl Into<String>) -> Self {
        Self {
            ordinal,
            cause,
            message: message.into(),
            timestamp: now(),
        }
    }

    /// Creates the failure recorded for an ordinal absent from a terminal response.
    #[must_use]
    pub fn missing_in_response(ordinal: Ordinal) -> Self {
        Self::new(ordinal, FailureCause::MissingInResponse, "missing in response")
    }
}
