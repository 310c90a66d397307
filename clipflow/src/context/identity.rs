//! Run identity for tracking pipeline executions.

use crate::utils::{now, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunIdentity {
    /// The unique ID for this run.
    pub run_id: Uuid,

    /// When the run started (wall clock).
    pub started_at: Timestamp,

    /// The session the run belongs to, if the caller tracks sessions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,

    /// The name of the pipeline being run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<String>,
}

impl RunIdentity {
    /// Creates a new run identity with a generated run ID.
    #[must_use]
    pub fn new() -> Self {
        Self::with_run_id(Uuid::new_v4())
    }

    /// Creates a run identity with a specific run ID.
    #[must_use]
    pub fn with_run_id(run_id: Uuid) -> Self {
        Self {
            run_id,
            started_at: now(),
            session_id: None,
            pipeline: None,
        }
    }

    /// Sets the session ID.
    #[must_use]
    pub fn with_session_id(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Sets the pipeline name.
    #[must_use]
    pub fn with_pipeline(mut self, pipeline: impl Into<String>) -> Self {
        self.pipeline = Some(pipeline.into());
        self
    }
}

impl Default for RunIdentity {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_identity_is_v4() {
        let identity = RunIdentity::new();
        assert_eq!(identity.run_id.get_version_num(), 4);
        assert!(identity.session_id.is_none());
    }

    #[test]
    fn test_run_identity_builders() {
        let session = Uuid::new_v4();
        let identity = RunIdentity::new()
            .with_session_id(session)
            .with_pipeline("VideoGenerationPipeline");

        assert_eq!(identity.session_id, Some(session));
        assert_eq!(identity.pipeline.as_deref(), Some("VideoGenerationPipeline"));

        let json = serde_json::to_value(&identity).unwrap();
        assert!(json.get("run_id").is_some());
        assert_eq!(json["pipeline"], "VideoGenerationPipeline");
    }
}
