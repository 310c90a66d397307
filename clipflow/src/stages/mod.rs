//! Stage trait and implementations.
//!
//! A stage reads its declared inputs and produces one value. It never writes
//! shared state itself; the executor merges the returned value under the
//! stage's output key.

mod capability_stage;
mod job_stage;

pub use capability_stage::CapabilityStage;
pub use job_stage::{JobPlanner, JobStage};

use crate::context::StageContext;
use crate::core::StageOutput;
use crate::errors::StageError;
use async_trait::async_trait;
use std::fmt::Debug;

/// Trait for pipeline stages.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Runs the stage.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The stage execution context
    ///
    /// # Returns
    ///
    /// The value to merge under the stage's output key.
    async fn run(&self, ctx: &StageContext) -> Result<StageOutput, StageError>;
}

/// A stage backed by a plain function. Useful for glue and tests.
pub struct FnStage<F>
where
    F: Fn(&StageContext) -> Result<StageOutput, StageError> + Send + Sync,
{
    label: String,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&StageContext) -> Result<StageOutput, StageError> + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(label: impl Into<String>, func: F) -> Self {
        Self {
            label: label.into(),
            func,
        }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&StageContext) -> Result<StageOutput, StageError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("label", &self.label).finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&StageContext) -> Result<StageOutput, StageError> + Send + Sync,
{
    async fn run(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        (self.func)(ctx)
    }
}
