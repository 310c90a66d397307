//! Per-job state machine and remote status mapping.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a single job is in its lifecycle.
///
/// `Submitted -> Polling -> {Succeeded, PartiallySucceeded, Failed, TimedOut, Cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    /// Submission accepted, not polled yet.
    Submitted,
    /// Waiting for a terminal status.
    Polling,
    /// Every expected ordinal produced an item.
    Succeeded,
    /// Some ordinals produced items, some failed or went missing.
    PartiallySucceeded,
    /// The job failed as a whole (remotely or at the transport level).
    Failed,
    /// The budget ran out first.
    TimedOut,
    /// The run was cancelled.
    Cancelled,
}

impl JobPhase {
    /// Returns true for phases a job never leaves.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Submitted | Self::Polling)
    }

    /// Returns the phase after a poll answered with `status`.
    ///
    /// Terminal phases never change. A finished status moves straight to the
    /// matching terminal phase; anything else keeps the job polling.
    #[must_use]
    pub const fn advance(self, status: &RemoteStatus) -> Self {
        if self.is_terminal() {
            return self;
        }
        match status {
            RemoteStatus::Succeeded => Self::Succeeded,
            RemoteStatus::PartiallySucceeded => Self::PartiallySucceeded,
            RemoteStatus::Failed => Self::Failed,
            RemoteStatus::Pending | RemoteStatus::Running | RemoteStatus::Unknown(_) => Self::Polling,
        }
    }

    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Polling => "polling",
            Self::Succeeded => "succeeded",
            Self::PartiallySucceeded => "partially_succeeded",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A remote status string mapped onto what the poller does next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatus {
    /// Queued, not started.
    Pending,
    /// In progress.
    Running,
    /// Finished, everything produced.
    Succeeded,
    /// Finished, some ordinals failed.
    PartiallySucceeded,
    /// Finished, nothing usable.
    Failed,
    /// Not a status this engine knows; polling continues.
    Unknown(String),
}

impl RemoteStatus {
    /// Maps a raw status string (case-insensitive).
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "queued" => Self::Pending,
            "running" | "processing" | "in_progress" => Self::Running,
            "succeeded" | "completed" | "success" => Self::Succeeded,
            "partially_succeeded" | "partial" => Self::PartiallySucceeded,
            "failed" | "error" => Self::Failed,
            _ => Self::Unknown(raw.to_string()),
        }
    }

    /// Returns true if the job has finished.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::PartiallySucceeded | Self::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_statuses() {
        assert_eq!(RemoteStatus::parse("queued"), RemoteStatus::Pending);
        assert_eq!(RemoteStatus::parse("Processing"), RemoteStatus::Running);
        assert_eq!(RemoteStatus::parse("completed"), RemoteStatus::Succeeded);
        assert_eq!(RemoteStatus::parse("partially_succeeded"), RemoteStatus::PartiallySucceeded);
        assert_eq!(RemoteStatus::parse(" ERROR "), RemoteStatus::Failed);
    }

    #[test]
    fn test_parse_unknown_status() {
        let status = RemoteStatus::parse("throttled");
        assert_eq!(status, RemoteStatus::Unknown("throttled".to_string()));
        assert!(!status.is_terminal());
    }

    #[test]
    fn test_phase_terminality() {
        assert!(!JobPhase::Submitted.is_terminal());
        assert!(!JobPhase::Polling.is_terminal());
        assert!(JobPhase::TimedOut.is_terminal());
        assert!(JobPhase::Cancelled.is_terminal());
        assert_eq!(JobPhase::PartiallySucceeded.to_string(), "partially_succeeded");
    }

    #[test]
    fn test_phase_advances_through_polling() {
        let running = RemoteStatus::parse("running");
        let phase = JobPhase::Submitted.advance(&running);
        assert_eq!(phase, JobPhase::Polling);
        assert_eq!(phase.advance(&RemoteStatus::parse("throttled")), JobPhase::Polling);
        assert_eq!(phase.advance(&RemoteStatus::parse("partial")), JobPhase::PartiallySucceeded);
        assert_eq!(JobPhase::Submitted.advance(&RemoteStatus::Failed), JobPhase::Failed);
    }

    #[test]
    fn test_terminal_phases_do_not_advance() {
        for phase in [JobPhase::Succeeded, JobPhase::Failed, JobPhase::TimedOut, JobPhase::Cancelled] {
            assert_eq!(phase.advance(&RemoteStatus::Running), phase);
        }
    }
}
