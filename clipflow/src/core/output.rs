//! The value a stage hands back to the executor.

use super::JobFailureItem;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The output of a stage execution.
///
/// `value` is merged into shared state under the stage's declared output key.
/// `failures` carries per-ordinal failures of a job stage that still produced
/// a usable value; the executor records them on the run outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutput {
    /// The produced value.
    pub value: serde_json::Value,

    /// Non-fatal per-ordinal failures.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<JobFailureItem>,

    /// Additional metadata (not merged into shared state).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl StageOutput {
    /// Creates an output holding `value`.
    #[must_use]
    pub fn new(value: serde_json::Value) -> Self {
        Self {
            value,
            failures: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Creates an output with partial failures attached.
    #[must_use]
    pub fn with_failures(value: serde_json::Value, failures: Vec<JobFailureItem>) -> Self {
        Self {
            value,
            failures,
            metadata: HashMap::new(),
        }
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns true if some ordinals failed.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

impl From<serde_json::Value> for StageOutput {
    fn from(value: serde_json::Value) -> Self {
        Self::new(value)
    }
}
