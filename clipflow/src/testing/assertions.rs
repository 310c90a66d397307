//! Assertions over run outcomes.

use crate::core::{FailureCause, JobResultItem, Ordinal};
use crate::pipeline::{FailureKind, PipelineOutcome, RunStatus};

/// Asserts that the run ended with `expected`.
pub fn assert_status(outcome: &PipelineOutcome, expected: RunStatus) {
    assert_eq!(
        outcome.status, expected,
        "Expected status {expected}, got {} (error: {:?})",
        outcome.status, outcome.error
    );
}

/// Asserts that the final state holds exactly `expected` keys, in merge order.
pub fn assert_state_keys(outcome: &PipelineOutcome, expected: &[&str]) {
    let keys: Vec<&str> = outcome.state.keys().collect();
    assert_eq!(keys, expected, "Unexpected state keys");
}

/// Asserts that `items` carry exactly `expected` ordinals, in order.
pub fn assert_ordinals(items: &[JobResultItem], expected: &[Ordinal]) {
    let ordinals: Vec<Ordinal> = items.iter().map(|item| item.ordinal).collect();
    assert_eq!(ordinals, expected, "Unexpected item ordinals");
}

/// Asserts the per-ordinal job failures recorded for `stage`.
pub fn assert_job_failures(outcome: &PipelineOutcome, stage: &str, expected: &[(Ordinal, FailureCause)]) {
    let failures: Vec<(Ordinal, FailureCause)> = outcome
        .failures
        .iter()
        .filter(|f| f.stage == stage)
        .filter_map(|f| match (f.kind, f.ordinal) {
            (FailureKind::Job(cause), Some(ordinal)) => Some((ordinal, cause)),
            _ => None,
        })
        .collect();
    assert_eq!(failures, expected, "Unexpected job failures for '{stage}'");
}
