//! Result aggregation for job batches.
//!
//! Collapses the per-ordinal outcome of a poller call into an ordinal-sorted
//! result set. Partial success is success: the call only fails when nothing
//! at all was produced and something went wrong.

use crate::core::{JobFailureItem, JobResultItem, Ordinal};
use crate::errors::AggregateError;
use crate::poller::PollOutcome;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::warn;

/// The usable results of a job batch plus everything that went wrong.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    /// Successful items, sorted by ordinal, one per ordinal.
    pub items: Vec<JobResultItem>,
    /// Failures, sorted by ordinal.
    pub failures: Vec<JobFailureItem>,
}

/// Success counts of an aggregate result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSummary {
    /// Ordinals with an item.
    pub succeeded: usize,
    /// Ordinals without one.
    pub failed: usize,
    /// All ordinals seen.
    pub total: usize,
}

impl fmt::Display for AggregateSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} succeeded", self.succeeded, self.total)
    }
}

/// Aggregates poller output.
///
/// Items come back sorted by ordinal. If two items share an ordinal the
/// first one wins.
///
/// # Errors
///
/// Returns `AggregateError` listing every failure when `items` is empty and
/// `failures` is not. Empty items with empty failures is an empty success.
pub fn aggregate(
    items: Vec<JobResultItem>,
    failures: Vec<JobFailureItem>,
) -> Result<AggregateResult, AggregateError> {
    let mut failures = failures;
    failures.sort_by_key(|f| f.ordinal);

    if items.is_empty() && !failures.is_empty() {
        return Err(AggregateError::new(failures));
    }

    Ok(AggregateResult {
        items: dedupe_sorted(items),
        failures,
    })
}

fn dedupe_sorted(mut items: Vec<JobResultItem>) -> Vec<JobResultItem> {
    // Stable sort keeps the first occurrence of each ordinal first.
    items.sort_by_key(|item| item.ordinal);
    let mut seen = HashSet::with_capacity(items.len());
    items.retain(|item| {
        let fresh = seen.insert(item.ordinal);
        if !fresh {
            warn!(ordinal = item.ordinal, "Dropping duplicate result item");
        }
        fresh
    });
    items
}

impl AggregateResult {
    /// Aggregates a poller outcome.
    ///
    /// # Errors
    ///
    /// See [`aggregate`].
    pub fn from_outcome(outcome: PollOutcome) -> Result<Self, AggregateError> {
        aggregate(outcome.items, outcome.failures)
    }

    /// Returns the ordinals that failed, sorted and deduplicated.
    #[must_use]
    pub fn missing_ordinals(&self) -> Vec<Ordinal> {
        let mut ordinals: Vec<Ordinal> = self.failures.iter().map(|f| f.ordinal).collect();
        ordinals.dedup();
        ordinals
    }

    /// Merges a re-submission outcome into this result.
    ///
    /// New items replace the failures recorded for their ordinals; new
    /// failures replace older failures for the same ordinal.
    pub fn absorb(&mut self, outcome: PollOutcome) {
        let recovered: HashSet<Ordinal> = outcome.items.iter().map(|i| i.ordinal).collect();
        let refailed: HashSet<Ordinal> = outcome.failures.iter().map(|f| f.ordinal).collect();

        self.failures
            .retain(|f| !recovered.contains(&f.ordinal) && !refailed.contains(&f.ordinal));
        self.failures.extend(outcome.failures);
        self.failures.sort_by_key(|f| f.ordinal);

        let mut items = std::mem::take(&mut self.items);
        items.extend(outcome.items);
        self.items = dedupe_sorted(items);
    }

    /// Returns success counts.
    #[must_use]
    pub fn summary(&self) -> AggregateSummary {
        let succeeded = self.items.len();
        let failed = self.missing_ordinals().len();
        AggregateSummary {
            succeeded,
            failed,
            total: succeeded + failed,
        }
    }

    /// Returns true if nothing failed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AssetHandle, FailureCause};
    use pretty_assertions::assert_eq;

    fn item(ordinal: Ordinal) -> JobResultItem {
        JobResultItem::new(ordinal, AssetHandle::new(format!("img-{ordinal}")))
    }

    fn failure(ordinal: Ordinal, cause: FailureCause) -> JobFailureItem {
        JobFailureItem::new(ordinal, cause, cause.as_str())
    }

    #[test]
    fn test_sorts_items_by_ordinal() {
        let result = aggregate(vec![item(3), item(0), item(1)], vec![failure(2, FailureCause::Timeout)]).unwrap();
        let ordinals: Vec<_> = result.items.iter().map(|i| i.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 3]);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.summary().to_string(), "3 of 4 succeeded");
    }

    #[test]
    fn test_all_failed_is_error() {
        let failures = vec![
            failure(3, FailureCause::Timeout),
            failure(0, FailureCause::SubmissionFailed),
            failure(1, FailureCause::TerminalFailure),
            failure(2, FailureCause::MissingInResponse),
        ];
        let err = aggregate(Vec::new(), failures).unwrap_err();

        assert_eq!(err.failures.len(), 4);
        let causes: Vec<_> = err.failures.iter().map(|f| f.cause).collect();
        assert_eq!(
            causes,
            vec![
                FailureCause::SubmissionFailed,
                FailureCause::TerminalFailure,
                FailureCause::MissingInResponse,
                FailureCause::Timeout,
            ]
        );
    }

    #[test]
    fn test_empty_is_success() {
        let result = aggregate(Vec::new(), Vec::new()).unwrap();
        assert!(result.items.is_empty());
        assert!(result.is_complete());
    }

    #[test]
    fn test_duplicate_ordinal_keeps_first() {
        let earlier = item(1).with_mime_type("image/jpeg");
        let later = item(1).with_mime_type("image/png");
        let result = aggregate(vec![earlier.clone(), item(0), later], Vec::new()).unwrap();

        assert_eq!(result.items.len(), 2);
        assert_eq!(result.items[1], earlier);
    }

    #[test]
    fn test_failures_keep_details() {
        let f = JobFailureItem::new(2, FailureCause::TerminalFailure, "nsfw filter");
        let result = aggregate(vec![item(0)], vec![f.clone()]).unwrap();
        assert_eq!(result.failures[0], f);
    }

    #[test]
    fn test_absorb_resubmission() {
        let mut result = aggregate(
            vec![item(0), item(3)],
            vec![failure(1, FailureCause::Timeout), failure(2, FailureCause::Timeout)],
        )
        .unwrap();
        assert_eq!(result.missing_ordinals(), vec![1, 2]);

        result.absorb(PollOutcome {
            items: vec![item(2)],
            failures: vec![failure(1, FailureCause::TerminalFailure)],
        });

        let ordinals: Vec<_> = result.items.iter().map(|i| i.ordinal).collect();
        assert_eq!(ordinals, vec![0, 2, 3]);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].cause, FailureCause::TerminalFailure);
        assert_eq!(
            result.summary(),
            AggregateSummary {
                succeeded: 3,
                failed: 1,
                total: 4
            }
        );
    }
}
