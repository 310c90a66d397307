//! Core domain model types for clipflow.
//!
//! This module contains the values that flow between stages, the poller and
//! the aggregator:
//! - Job and asset handles
//! - Per-ordinal job result and failure items
//! - Stage output

mod handles;
mod items;
mod output;

pub use handles::{AssetHandle, JobHandle, Ordinal};
pub use items::{FailureCause, JobFailureItem, JobResultItem};
pub use output::StageOutput;
