//! A stage that forwards its inputs to a generation capability.

use super::Stage;
use crate::capability::GenerationCapability;
use crate::context::StageContext;
use crate::core::StageOutput;
use crate::errors::StageError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Calls one [`GenerationCapability`] with the stage's declared inputs.
#[derive(Clone)]
pub struct CapabilityStage {
    capability: Arc<dyn GenerationCapability>,
}

impl CapabilityStage {
    /// Creates a stage over `capability`.
    #[must_use]
    pub fn new(capability: Arc<dyn GenerationCapability>) -> Self {
        Self { capability }
    }
}

impl std::fmt::Debug for CapabilityStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityStage").finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for CapabilityStage {
    async fn run(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        debug!(stage = %ctx.stage_name(), inputs = ?ctx.inputs().declared(), "Invoking capability");
        let value = self.capability.invoke(ctx.inputs()).await?;
        Ok(StageOutput::new(value))
    }
}
