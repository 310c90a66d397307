//! Testing utilities for clipflow pipelines.
//!
//! This module provides:
//! - Capability doubles, including a scripted long-running job service
//! - Stage context builders for exercising a stage outside a pipeline
//! - Assertions over run outcomes

mod assertions;
mod mocks;

pub use assertions::{
    assert_job_failures, assert_ordinals, assert_state_keys, assert_status,
};
pub use mocks::{
    call_log, CallLog, FailingCapability, ScriptStep, ScriptedJobCapability, SlowCapability,
    StaticCapability,
};

use crate::cancellation::CancellationToken;
use crate::capability::InMemoryAssetStore;
use crate::context::{RunIdentity, StageContext, StageInputs};
use crate::events::{CollectingEventSink, NoOpEventSink};
use std::sync::Arc;

/// Builds a standalone stage context with a fresh token and asset store.
#[must_use]
pub fn stage_context(name: &str, inputs: StageInputs) -> StageContext {
    StageContext::new(
        name,
        RunIdentity::new(),
        inputs,
        Arc::new(CancellationToken::new()),
        Arc::new(InMemoryAssetStore::new()),
        Arc::new(NoOpEventSink),
    )
}

/// Like [`stage_context`], but events go to `sink`.
#[must_use]
pub fn stage_context_with_sink(
    name: &str,
    inputs: StageInputs,
    sink: Arc<CollectingEventSink>,
) -> StageContext {
    StageContext::new(
        name,
        RunIdentity::new(),
        inputs,
        Arc::new(CancellationToken::new()),
        Arc::new(InMemoryAssetStore::new()),
        sink,
    )
}
