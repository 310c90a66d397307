//! Time and concurrency limits for one poller call.

use crate::errors::PollerError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Default total wait per job.
pub const DEFAULT_TOTAL_WAIT: Duration = Duration::from_secs(300);

/// Default pause between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default number of consecutive transport errors tolerated per job.
pub const DEFAULT_TRANSPORT_RETRIES: u32 = 3;

/// Default number of jobs in flight at once.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Furthest deadline the poller will schedule, about thirty years out.
const MAX_HORIZON: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Bounds on how long and how widely the poller works.
///
/// `total_wait` is measured on a monotonic clock from the moment the poller
/// is called. Every sleep is clipped to the remaining budget and every remote
/// call is bounded by the deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollBudget {
    /// Maximum wall time for the whole call.
    pub total_wait: Duration,
    /// Pause between polls of the same job.
    pub poll_interval: Duration,
    /// Transport errors tolerated per job before it is given up.
    pub transport_retries: u32,
    /// Jobs submitted and polled concurrently.
    pub max_concurrency: usize,
}

impl Default for PollBudget {
    fn default() -> Self {
        Self {
            total_wait: DEFAULT_TOTAL_WAIT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            transport_retries: DEFAULT_TRANSPORT_RETRIES,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

impl PollBudget {
    /// Creates a budget with the given wait and interval and default limits.
    #[must_use]
    pub fn new(total_wait: Duration, poll_interval: Duration) -> Self {
        Self {
            total_wait,
            poll_interval,
            ..Self::default()
        }
    }

    /// Sets the transport retry limit.
    #[must_use]
    pub fn with_transport_retries(mut self, retries: u32) -> Self {
        self.transport_retries = retries;
        self
    }

    /// Sets the concurrency limit.
    #[must_use]
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    /// Returns the instant `total_wait` after `start`.
    ///
    /// Waits longer than about thirty years are clamped so the clock never overflows.
    #[must_use]
    pub fn deadline_from(&self, start: Instant) -> Instant {
        start
            .checked_add(self.total_wait.min(MAX_HORIZON))
            .unwrap_or(start)
    }

    /// Checks the budget can be honoured.
    ///
    /// # Errors
    ///
    /// Returns `PollerError::InvalidBudget` for a zero wait, interval or concurrency.
    pub fn validate(&self) -> Result<(), PollerError> {
        if self.total_wait.is_zero() {
            return Err(PollerError::InvalidBudget("total_wait must be positive".to_string()));
        }
        if self.poll_interval.is_zero() {
            return Err(PollerError::InvalidBudget("poll_interval must be positive".to_string()));
        }
        if self.max_concurrency == 0 {
            return Err(PollerError::InvalidBudget("max_concurrency must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_budget() {
        let budget = PollBudget::default();
        assert_eq!(budget.total_wait, Duration::from_secs(300));
        assert_eq!(budget.poll_interval, Duration::from_secs(5));
        assert_eq!(budget.transport_retries, 3);
        assert_eq!(budget.max_concurrency, 4);
        assert!(budget.validate().is_ok());
    }

    #[test]
    fn test_invalid_budgets() {
        let zero_wait = PollBudget::new(Duration::ZERO, Duration::from_secs(1));
        assert!(matches!(zero_wait.validate(), Err(PollerError::InvalidBudget(_))));

        let zero_interval = PollBudget::new(Duration::from_secs(1), Duration::ZERO);
        assert!(zero_interval.validate().is_err());

        let no_workers = PollBudget::default().with_max_concurrency(0);
        assert!(no_workers.validate().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_clamps_huge_waits() {
        let start = Instant::now();
        let short = budget_of(Duration::from_secs(30));
        assert_eq!(short.deadline_from(start), start + Duration::from_secs(30));

        let huge = budget_of(Duration::from_secs(u64::MAX));
        assert!(huge.validate().is_ok());
        assert_eq!(huge.deadline_from(start), start + MAX_HORIZON);
    }

    fn budget_of(total_wait: Duration) -> PollBudget {
        PollBudget::new(total_wait, Duration::from_secs(5))
    }
}
