//! Synchronous-style generation calls (script writing, speech, prompt writing).

use crate::context::StageInputs;
use crate::errors::CapabilityError;
use async_trait::async_trait;

/// An external service that turns declared inputs into one value.
///
/// Implementations wrap the actual network call; the engine only sees the
/// inputs going in and the JSON value coming out.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationCapability: Send + Sync {
    /// Invokes the capability.
    async fn invoke(&self, inputs: &StageInputs) -> Result<serde_json::Value, CapabilityError>;
}

#[async_trait]
impl<T: GenerationCapability + ?Sized> GenerationCapability for std::sync::Arc<T> {
    async fn invoke(&self, inputs: &StageInputs) -> Result<serde_json::Value, CapabilityError> {
        (**self).invoke(inputs).await
    }
}
