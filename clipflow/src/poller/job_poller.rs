//! Submits long-running jobs and polls them to completion under a budget.

use super::{JobPhase, JobSpec, PollBudget, RemoteStatus};
use crate::cancellation::CancellationToken;
use crate::capability::{AsyncJobCapability, JobSubmission, PollResponse};
use crate::core::{FailureCause, JobFailureItem, JobHandle, JobResultItem, Ordinal};
use crate::errors::PollerError;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

/// Everything the poller learned about a job spec.
///
/// Both lists are sorted by ordinal. Every requested ordinal appears in
/// exactly one of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollOutcome {
    /// Successful items.
    pub items: Vec<JobResultItem>,
    /// Per-ordinal failures.
    pub failures: Vec<JobFailureItem>,
}

impl PollOutcome {
    /// Returns true if no ordinal failed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Returns the ordinals that failed.
    #[must_use]
    pub fn failed_ordinals(&self) -> Vec<Ordinal> {
        self.failures.iter().map(|f| f.ordinal).collect()
    }
}

/// What happened to one job.
#[derive(Debug)]
struct JobReport {
    phase: JobPhase,
    items: Vec<JobResultItem>,
    failures: Vec<JobFailureItem>,
}

impl JobReport {
    fn failed_all(phase: JobPhase, ordinals: &[Ordinal], cause: FailureCause, message: &str) -> Self {
        Self {
            phase,
            items: Vec::new(),
            failures: ordinals
                .iter()
                .map(|&ordinal| JobFailureItem::new(ordinal, cause, message))
                .collect(),
        }
    }
}

/// Drives an [`AsyncJobCapability`] for one job spec at a time.
///
/// Each job gets its own poll loop; loops run concurrently up to the
/// budget's concurrency limit and share a single deadline. A failing job
/// only ever produces failure items for its own ordinals.
#[derive(Clone)]
pub struct JobPoller {
    capability: Arc<dyn AsyncJobCapability>,
}

impl JobPoller {
    /// Creates a poller over a job capability.
    #[must_use]
    pub fn new(capability: Arc<dyn AsyncJobCapability>) -> Self {
        Self { capability }
    }

    /// Submits every job of `spec` and waits for all of them, within `budget`.
    ///
    /// Returns successes and per-ordinal failures; it never fails because of a
    /// remote failure. Ordinals still pending when the budget runs out become
    /// `Timeout` failures.
    ///
    /// # Errors
    ///
    /// Returns `PollerError::InvalidSpec` or `PollerError::InvalidBudget`
    /// before submitting anything, and `PollerError::Cancelled` as soon as
    /// `cancel` fires.
    pub async fn submit_and_await(
        &self,
        spec: &JobSpec,
        budget: &PollBudget,
        cancel: &CancellationToken,
    ) -> Result<PollOutcome, PollerError> {
        spec.validate()?;
        budget.validate()?;
        if cancel.is_cancelled() {
            return Err(PollerError::Cancelled(cancel.reason_or_default()));
        }

        let deadline = budget.deadline_from(Instant::now());
        let submissions = spec.submissions();
        info!(
            jobs = submissions.len(),
            ordinals = spec.len(),
            total_wait_ms = crate::utils::duration_ms(budget.total_wait),
            "Submitting jobs"
        );

        let reports: Vec<JobReport> = stream::iter(submissions)
            .map(|submission| self.drive_job(submission, budget, deadline, cancel))
            .buffer_unordered(budget.max_concurrency)
            .try_collect()
            .await?;

        let mut outcome = PollOutcome::default();
        for report in reports {
            outcome.items.extend(report.items);
            outcome.failures.extend(report.failures);
        }
        outcome.items.sort_by_key(|item| item.ordinal);
        outcome.failures.sort_by_key(|failure| failure.ordinal);

        info!(
            succeeded = outcome.items.len(),
            failed = outcome.failures.len(),
            "Jobs finished"
        );
        Ok(outcome)
    }

    async fn drive_job(
        &self,
        submission: JobSubmission,
        budget: &PollBudget,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<JobReport, PollerError> {
        let ordinals = submission.ordinals();

        if Instant::now() >= deadline {
            warn!(ordinals = ?ordinals, "Budget exhausted before submission");
            return Ok(JobReport::failed_all(
                JobPhase::TimedOut,
                &ordinals,
                FailureCause::Timeout,
                "budget exhausted before submission",
            ));
        }

        let submitted = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(ordinals = ?ordinals, phase = %JobPhase::Cancelled, "Job abandoned before submission");
                return Err(cancelled(cancel));
            }
            result = timeout_at(deadline, self.capability.submit(&submission)) => result,
        };

        let handle = match submitted {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                warn!(ordinals = ?ordinals, error = %e, "Job submission failed");
                return Ok(JobReport::failed_all(
                    JobPhase::Failed,
                    &ordinals,
                    FailureCause::SubmissionFailed,
                    &e.to_string(),
                ));
            }
            Err(_) => {
                warn!(ordinals = ?ordinals, "Job submission did not return within budget");
                return Ok(JobReport::failed_all(
                    JobPhase::TimedOut,
                    &ordinals,
                    FailureCause::Timeout,
                    "submission did not complete within budget",
                ));
            }
        };

        debug!(job = %handle, ordinals = ?ordinals, phase = %JobPhase::Submitted, "Job submitted");
        let report = self
            .poll_until_terminal(&handle, &ordinals, budget, deadline, cancel)
            .await?;
        info!(
            job = %handle,
            phase = %report.phase,
            succeeded = report.items.len(),
            failed = report.failures.len(),
            "Job finished"
        );
        Ok(report)
    }

    async fn poll_until_terminal(
        &self,
        handle: &JobHandle,
        ordinals: &[Ordinal],
        budget: &PollBudget,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<JobReport, PollerError> {
        let timed_out = || {
            warn!(job = %handle, phase = %JobPhase::TimedOut, "Job did not finish within budget");
            JobReport::failed_all(
                JobPhase::TimedOut,
                ordinals,
                FailureCause::Timeout,
                &format!("no terminal status within {:?}", budget.total_wait),
            )
        };

        let abandon = |phase: JobPhase| {
            debug!(job = %handle, from = %phase, phase = %JobPhase::Cancelled, "Job abandoned on cancellation");
            cancelled(cancel)
        };

        // Consecutive transport errors; a successful poll resets the count.
        let mut transport_errors: u32 = 0;
        let mut phase = JobPhase::Submitted;

        loop {
            let polled = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(abandon(phase)),
                result = timeout_at(deadline, self.capability.poll(handle)) => result,
            };

            match polled {
                Err(_) => return Ok(timed_out()),
                Ok(Err(e)) => {
                    transport_errors += 1;
                    if transport_errors > budget.transport_retries {
                        warn!(job = %handle, errors = transport_errors, error = %e, "Giving up after transport errors");
                        return Ok(JobReport::failed_all(
                            JobPhase::Failed,
                            ordinals,
                            FailureCause::TransportFailed,
                            &e.to_string(),
                        ));
                    }
                    debug!(job = %handle, attempt = transport_errors, error = %e, "Poll failed, retrying");
                }
                Ok(Ok(response)) => {
                    transport_errors = 0;
                    let status = RemoteStatus::parse(&response.status);
                    let next = phase.advance(&status);
                    if next != phase {
                        debug!(job = %handle, from = %phase, to = %next, "Job phase changed");
                        phase = next;
                    }
                    match status {
                        RemoteStatus::Succeeded | RemoteStatus::PartiallySucceeded => {
                            return Ok(collect_terminal(handle, ordinals, response));
                        }
                        RemoteStatus::Failed => {
                            let cause = response.cause.unwrap_or_else(|| "job failed".to_string());
                            warn!(job = %handle, cause = %cause, "Job failed");
                            return Ok(JobReport::failed_all(
                                JobPhase::Failed,
                                ordinals,
                                FailureCause::TerminalFailure,
                                &cause,
                            ));
                        }
                        RemoteStatus::Pending | RemoteStatus::Running => {
                            debug!(job = %handle, status = %response.status, "Job not finished");
                        }
                        RemoteStatus::Unknown(status) => {
                            warn!(job = %handle, status = %status, "Unknown job status, continuing to poll");
                        }
                    }
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(timed_out());
            }
            let pause = budget.poll_interval.min(deadline - now);
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(abandon(phase)),
                () = tokio::time::sleep(pause) => {}
            }
        }
    }
}

impl std::fmt::Debug for JobPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobPoller").finish_non_exhaustive()
    }
}

fn cancelled(cancel: &CancellationToken) -> PollerError {
    PollerError::Cancelled(cancel.reason_or_default())
}

/// Splits a terminal response into items and failures for the expected ordinals.
fn collect_terminal(handle: &JobHandle, ordinals: &[Ordinal], response: PollResponse) -> JobReport {
    let expected: BTreeSet<Ordinal> = ordinals.iter().copied().collect();
    let mut accounted: HashSet<Ordinal> = HashSet::with_capacity(expected.len());
    let mut items = Vec::new();
    let mut failures = Vec::new();

    for item in response.items {
        if !expected.contains(&item.ordinal) {
            warn!(job = %handle, ordinal = item.ordinal, "Discarding item with unexpected ordinal");
            continue;
        }
        if !accounted.insert(item.ordinal) {
            warn!(job = %handle, ordinal = item.ordinal, "Discarding duplicate item");
            continue;
        }
        items.push(item);
    }

    for failed in response.failed {
        if expected.contains(&failed.ordinal) && accounted.insert(failed.ordinal) {
            failures.push(JobFailureItem::new(
                failed.ordinal,
                FailureCause::TerminalFailure,
                failed.message,
            ));
        }
    }

    for &ordinal in &expected {
        if !accounted.contains(&ordinal) {
            warn!(job = %handle, ordinal, "Expected ordinal missing in response");
            failures.push(JobFailureItem::missing_in_response(ordinal));
        }
    }

    let phase = if failures.is_empty() {
        JobPhase::Succeeded
    } else if items.is_empty() {
        JobPhase::Failed
    } else {
        JobPhase::PartiallySucceeded
    };

    JobReport {
        phase,
        items,
        failures,
    }
}
