//! Interfaces to the external services the pipeline drives.
//!
//! The engine never performs generation itself. Stages call
//! [`GenerationCapability`] for one-shot work, the poller drives
//! [`AsyncJobCapability`] for long-running jobs, and binary outputs live
//! behind an [`AssetStore`].

mod assets;
mod generation;
mod jobs;
mod retry;

pub use assets::{content_handle, AssetStore, InMemoryAssetStore};
#[cfg(test)]
pub use generation::MockGenerationCapability;
pub use generation::GenerationCapability;
pub use jobs::{AsyncJobCapability, JobSubmission, OrdinalError, PollResponse};
pub use retry::{with_retry, BackoffStrategy, JitterStrategy, RetryPolicy, RetryingCapability};
