//! Pipeline building and execution.
//!
//! This module provides:
//! - Stage descriptors and sequential/parallel stage groups
//! - A pipeline builder with static validation
//! - The group-by-group executor
//! - Failure modes and the failure ledger of a run

mod builder;
mod executor;
mod failure_tolerance;
mod outcome;
mod spec;


pub use builder::PipelineBuilder;
pub use executor::Pipeline;
pub use failure_tolerance::{FailureCollector, FailureKind, FailureMode, FailureRecord};
pub use outcome::{PipelineOutcome, RunStatus};
pub use spec::{
    GroupDescription, PipelineDescription, StageDescription, StageDescriptor, StageGroup,
};
