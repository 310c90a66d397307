//! Asynchronous job services (image synthesis and similar).

use crate::core::{JobHandle, JobResultItem, Ordinal};
use crate::errors::CapabilityError;
use crate::poller::SubRequest;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One submission: a single job covering one or more ordinals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSubmission {
    /// The sub-requests carried by this job, in ordinal order.
    pub requests: Vec<SubRequest>,
}

impl JobSubmission {
    /// Creates a submission.
    #[must_use]
    pub fn new(requests: Vec<SubRequest>) -> Self {
        Self { requests }
    }

    /// Returns the ordinals this job is expected to produce.
    #[must_use]
    pub fn ordinals(&self) -> Vec<Ordinal> {
        self.requests.iter().map(|r| r.ordinal).collect()
    }

    /// Returns the lowest ordinal of the job, used to identify it in logs.
    #[must_use]
    pub fn first_ordinal(&self) -> Option<Ordinal> {
        self.requests.iter().map(|r| r.ordinal).min()
    }
}

/// An ordinal the service reported as failed inside an otherwise terminal response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrdinalError {
    /// The failed ordinal.
    pub ordinal: Ordinal,
    /// The service's explanation.
    pub message: String,
}

impl OrdinalError {
    /// Creates a new ordinal error.
    #[must_use]
    pub fn new(ordinal: Ordinal, message: impl Into<String>) -> Self {
        Self {
            ordinal,
            message: message.into(),
        }
    }
}

/// The service's answer to one poll.
///
/// `status` is the raw remote string; the poller maps it to a phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollResponse {
    /// Raw remote status.
    pub status: String,
    /// Items produced so far (only read on terminal success).
    #[serde(default)]
    pub items: Vec<JobResultItem>,
    /// Ordinals reported as failed.
    #[serde(default)]
    pub failed: Vec<OrdinalError>,
    /// Failure explanation for a failed job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl PollResponse {
    /// Creates a response with only a status.
    #[must_use]
    pub fn with_status(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            items: Vec::new(),
            failed: Vec::new(),
            cause: None,
        }
    }

    /// A job that has not started.
    #[must_use]
    pub fn pending() -> Self {
        Self::with_status("pending")
    }

    /// A job that is running.
    #[must_use]
    pub fn running() -> Self {
        Self::with_status("running")
    }

    /// A job that finished with `items`.
    #[must_use]
    pub fn succeeded(items: Vec<JobResultItem>) -> Self {
        Self {
            items,
            ..Self::with_status("succeeded")
        }
    }

    /// A job that finished with some items and some failed ordinals.
    #[must_use]
    pub fn partially_succeeded(items: Vec<JobResultItem>, failed: Vec<OrdinalError>) -> Self {
        Self {
            items,
            failed,
            ..Self::with_status("partially_succeeded")
        }
    }

    /// A job that failed as a whole.
    #[must_use]
    pub fn failed(cause: impl Into<String>) -> Self {
        Self {
            cause: Some(cause.into()),
            ..Self::with_status("failed")
        }
    }
}

/// An external service that runs long jobs behind submit/poll.
#[async_trait]
pub trait AsyncJobCapability: Send + Sync {
    /// Submits a job and returns its handle.
    async fn submit(&self, submission: &JobSubmission) -> Result<JobHandle, CapabilityError>;

    /// Polls a job once.
    async fn poll(&self, handle: &JobHandle) -> Result<PollResponse, CapabilityError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AssetHandle;
    use serde_json::json;

    #[test]
    fn test_submission_ordinals() {
        let submission = JobSubmission::new(vec![
            SubRequest::new(2, json!("b")),
            SubRequest::new(1, json!("a")),
        ]);
        assert_eq!(submission.ordinals(), vec![2, 1]);
        assert_eq!(submission.first_ordinal(), Some(1));
    }

    #[test]
    fn test_poll_response_constructors() {
        let ok = PollResponse::succeeded(vec![JobResultItem::new(0, AssetHandle::new("a"))]);
        assert_eq!(ok.status, "succeeded");
        assert_eq!(ok.items.len(), 1);

        let failed = PollResponse::failed("content policy");
        assert_eq!(failed.status, "failed");
        assert_eq!(failed.cause.as_deref(), Some("content policy"));

        let partial = PollResponse::partially_succeeded(Vec::new(), vec![OrdinalError::new(1, "nsfw")]);
        assert_eq!(partial.failed[0].ordinal, 1);
    }

    #[test]
    fn test_poll_response_deserializes_sparse_json() {
        let response: PollResponse = serde_json::from_value(json!({"status": "queued"})).unwrap();
        assert_eq!(response, PollResponse::with_status("queued"));
    }
}
