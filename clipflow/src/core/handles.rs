//! Opaque identifiers handed out by external services.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a sub-request within a job spec (0-based).
///
/// Result ordering is always by ordinal, never by completion order.
pub type Ordinal = usize;

/// Opaque identifier returned by a job submission.
///
/// Owned by the poll loop for that job and dropped when the loop ends.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    /// Creates a new job handle.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque reference to a binary asset held by an asset store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetHandle(String);

impl AssetHandle {
    /// Creates a new asset handle.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_serialize_transparently() {
        let job = JobHandle::new("job-42");
        assert_eq!(serde_json::to_value(&job).unwrap(), serde_json::json!("job-42"));

        let asset: AssetHandle = serde_json::from_value(serde_json::json!("mem://abc")).unwrap();
        assert_eq!(asset.as_str(), "mem://abc");
        assert_eq!(asset.to_string(), "mem://abc");
    }
}
