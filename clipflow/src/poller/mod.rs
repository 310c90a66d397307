//! Long-running job poller.
//!
//! Turns a [`JobSpec`] into one or more remote jobs, polls each to a terminal
//! state under a [`PollBudget`], and reports per-ordinal successes and
//! failures. Remote failures never abort sibling ordinals.

mod budget;
mod job_poller;
mod phase;
mod spec;

pub use budget::{
    PollBudget, DEFAULT_MAX_CONCURRENCY, DEFAULT_POLL_INTERVAL, DEFAULT_TOTAL_WAIT,
    DEFAULT_TRANSPORT_RETRIES,
};
pub use job_poller::{JobPoller, PollOutcome};
pub use phase::{JobPhase, RemoteStatus};
pub use spec::{Batching, JobSpec, SubRequest};
