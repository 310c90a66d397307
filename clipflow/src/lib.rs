//! # Clipflow
//!
//! Stage orchestration and long-running job polling for topic-to-video
//! generation.
//!
//! Clipflow runs a pipeline of named stages over a shared state:
//!
//! - **Stage groups**: sequential groups see each member's output as it
//!   lands; parallel groups run against one snapshot and merge in declared
//!   order
//! - **Failure modes**: fail fast, or keep running independent stages and
//!   skip the ones whose inputs never arrived
//! - **Job polling**: submit batches of long-running jobs, poll them under a
//!   wall-clock budget, and resolve every ordinal to an item or a failure
//! - **Best-effort aggregation**: a stage succeeds as long as one ordinal
//!   produced an item
//! - **Cancellation**: one token per run, observed between groups, inside
//!   stages, and between polls
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use clipflow::prelude::*;
//!
//! let video = VideoPipeline::new(&capabilities, &PipelineConfig::default())?;
//! let outcome = video.generate("how tides work", Arc::new(CancellationToken::new())).await;
//! println!("{}: {:?}", outcome.status, outcome.state.get(VIDEO_KEY));
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod aggregate;
pub mod cancellation;
pub mod capability;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod poller;
pub mod stages;
pub mod testing;
pub mod utils;
pub mod video;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::aggregate::{aggregate, AggregateResult, AggregateSummary};
    pub use crate::cancellation::CancellationToken;
    pub use crate::capability::{
        AssetStore, AsyncJobCapability, GenerationCapability, InMemoryAssetStore, JobSubmission,
        PollResponse, RetryPolicy, RetryingCapability,
    };
    pub use crate::config::{JobStageConfig, LogConfig, PipelineConfig, RetryConfig, VideoConfig};
    pub use crate::context::{FinalState, RunIdentity, StageContext, StageInputs, StateSnapshot};
    pub use crate::core::{
        AssetHandle, FailureCause, JobFailureItem, JobHandle, JobResultItem, Ordinal, StageOutput,
    };
    pub use crate::errors::{
        AggregateError, CapabilityError, ClipflowError, ConfigError, PipelineError,
        PipelineValidationError, PollerError, StageError,
    };
    pub use crate::events::{EventKind, EventSink, LoggingEventSink, NoOpEventSink, PipelineEvent};
    pub use crate::observability::init_logging;
    pub use crate::pipeline::{
        FailureMode, FailureRecord, Pipeline, PipelineBuilder, PipelineOutcome, RunStatus,
        StageDescriptor,
    };
    pub use crate::poller::{Batching, JobPoller, JobSpec, PollBudget, SubRequest};
    pub use crate::stages::{CapabilityStage, JobPlanner, JobStage, Stage};
    pub use crate::video::{VideoCapabilities, VideoPipeline, VIDEO_KEY};
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    #[test]
    fn prelude_builds_a_config() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.failure_mode, FailureMode::FailFast);
    }
}
