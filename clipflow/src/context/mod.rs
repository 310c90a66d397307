//! Shared state and the per-stage execution context.
//!
//! This module provides:
//! - `SharedState`, the owner-checked result bag of a run
//! - Immutable snapshots handed to stages
//! - Strict, declared-only stage inputs

mod bags;
mod execution;
mod identity;
mod inputs;
mod snapshot;

pub use bags::{FinalState, SharedState, StateWrite, INPUT_OWNER, RESERVED_INPUT_KEY};
pub use execution::StageContext;
pub use identity::RunIdentity;
pub use inputs::StageInputs;
pub use snapshot::StateSnapshot;
