//! Job specs: what to submit and how to split it into jobs.

use crate::capability::JobSubmission;
use crate::core::Ordinal;
use crate::errors::PollerError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One unit of requested work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubRequest {
    /// Position of the result in the final, ordinal-sorted output.
    pub ordinal: Ordinal,
    /// Service-specific request body.
    pub payload: serde_json::Value,
}

impl SubRequest {
    /// Creates a sub-request.
    #[must_use]
    pub fn new(ordinal: Ordinal, payload: serde_json::Value) -> Self {
        Self { ordinal, payload }
    }
}

/// How sub-requests are grouped into jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum Batching {
    /// One job per ordinal.
    #[default]
    PerOrdinal,
    /// Jobs of up to `max_per_job` consecutive ordinals.
    Batched {
        /// Largest number of ordinals in one job.
        max_per_job: usize,
    },
}

/// The full request handed to the poller.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobSpec {
    /// The requested work.
    pub requests: Vec<SubRequest>,
    /// How the work is grouped into jobs.
    #[serde(default)]
    pub batching: Batching,
}

impl JobSpec {
    /// Creates a per-ordinal spec.
    #[must_use]
    pub fn new(requests: Vec<SubRequest>) -> Self {
        Self {
            requests,
            batching: Batching::PerOrdinal,
        }
    }

    /// Creates a spec from payloads, numbering them from 0.
    #[must_use]
    pub fn from_payloads<I: IntoIterator<Item = serde_json::Value>>(payloads: I) -> Self {
        Self::new(
            payloads
                .into_iter()
                .enumerate()
                .map(|(ordinal, payload)| SubRequest::new(ordinal, payload))
                .collect(),
        )
    }

    /// Sets the batching mode.
    #[must_use]
    pub fn with_batching(mut self, batching: Batching) -> Self {
        self.batching = batching;
        self
    }

    /// Returns the requested ordinals, sorted.
    #[must_use]
    pub fn ordinals(&self) -> Vec<Ordinal> {
        let mut ordinals: Vec<Ordinal> = self.requests.iter().map(|r| r.ordinal).collect();
        ordinals.sort_unstable();
        ordinals
    }

    /// Returns the number of sub-requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Returns true if nothing is requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Builds a spec holding only `ordinals`, with the same batching.
    ///
    /// Used to re-submit the ordinals that failed in an earlier attempt.
    #[must_use]
    pub fn subset(&self, ordinals: &[Ordinal]) -> Self {
        let wanted: HashSet<Ordinal> = ordinals.iter().copied().collect();
        Self {
            requests: self
                .requests
                .iter()
                .filter(|r| wanted.contains(&r.ordinal))
                .cloned()
                .collect(),
            batching: self.batching,
        }
    }

    /// Checks the spec can be submitted.
    ///
    /// # Errors
    ///
    /// Returns `PollerError::InvalidSpec` for an empty spec, duplicate ordinals
    /// or a zero batch size.
    pub fn validate(&self) -> Result<(), PollerError> {
        if self.requests.is_empty() {
            return Err(PollerError::InvalidSpec("no sub-requests".to_string()));
        }
        let mut seen = HashSet::with_capacity(self.requests.len());
        for request in &self.requests {
            if !seen.insert(request.ordinal) {
                return Err(PollerError::InvalidSpec(format!(
                    "duplicate ordinal {}",
                    request.ordinal
                )));
            }
        }
        if self.batching == (Batching::Batched { max_per_job: 0 }) {
            return Err(PollerError::InvalidSpec("max_per_job must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Splits the spec into submissions, in ordinal order.
    #[must_use]
    pub fn submissions(&self) -> Vec<JobSubmission> {
        let mut requests = self.requests.clone();
        requests.sort_by_key(|r| r.ordinal);

        match self.batching {
            Batching::PerOrdinal => requests
                .into_iter()
                .map(|r| JobSubmission::new(vec![r]))
                .collect(),
            Batching::Batched { max_per_job } => requests
                .chunks(max_per_job.max(1))
                .map(|chunk| JobSubmission::new(chunk.to_vec()))
                .collect(),
        }
    }
}
