//! Final video assembly.

use super::{AUDIO_KEY, IMAGES_KEY};
use super::scenes::ScenePlan;
use crate::capability::GenerationCapability;
use crate::context::StageContext;
use crate::core::{JobResultItem, StageOutput};
use crate::errors::{CapabilityError, StageError};
use crate::stages::Stage;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Key under which the assembler capability receives the scene plan.
pub const SCENE_PLAN_KEY: &str = "scene_plan";

/// Plans scenes from the narration and the surviving images, then hands
/// everything to the assembler capability.
///
/// Images whose assets no longer resolve are dropped; the stage fails only
/// if none are left.
pub struct AssemblyStage {
    capability: Arc<dyn GenerationCapability>,
}

impl AssemblyStage {
    /// Creates an assembly stage.
    #[must_use]
    pub fn new(capability: Arc<dyn GenerationCapability>) -> Self {
        Self { capability }
    }
}

impl std::fmt::Debug for AssemblyStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssemblyStage").finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for AssemblyStage {
    async fn run(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let inputs = ctx.inputs();
        let images: Vec<JobResultItem> = inputs.get_as(IMAGES_KEY)?;
        let narration = inputs
            .require(AUDIO_KEY)?
            .get("duration_seconds")
            .and_then(serde_json::Value::as_f64);

        let total = images.len();
        let mut usable = Vec::with_capacity(total);
        for image in images {
            if ctx.assets().contains(&image.asset).await {
                usable.push(image);
            } else {
                warn!(ordinal = image.ordinal, asset = %image.asset, "Image asset not found, skipping");
            }
        }
        if usable.is_empty() {
            return Err(CapabilityError::AssetNotFound(format!("none of {total} image(s) resolve")).into());
        }

        let plan = ScenePlan::compute(narration, &usable);
        info!(
            images = usable.len(),
            duration_seconds = plan.duration_seconds,
            image_seconds = plan.image_duration_seconds,
            transition_seconds = plan.transition_seconds,
            "Assembling video"
        );

        let plan_json = serde_json::to_value(&plan).map_err(|e| CapabilityError::Other(e.into()))?;
        let usable_json = serde_json::to_value(&usable).map_err(|e| CapabilityError::Other(e.into()))?;
        let assembly_inputs = inputs
            .clone()
            .with_derived(IMAGES_KEY, usable_json)
            .with_derived(SCENE_PLAN_KEY, plan_json.clone());

        let value = self.capability.invoke(&assembly_inputs).await?;
        Ok(StageOutput::new(value).with_metadata(SCENE_PLAN_KEY, plan_json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{AssetStore, InMemoryAssetStore};
    use crate::cancellation::CancellationToken;
    use crate::context::{RunIdentity, StageInputs};
    use crate::core::AssetHandle;
    use crate::events::NoOpEventSink;
    use crate::testing::StaticCapability;
    use serde_json::json;

    async fn context_with(store: Arc<InMemoryAssetStore>, images: Vec<JobResultItem>) -> StageContext {
        let inputs = StageInputs::from_pairs(
            "VideoAssembler",
            [
                (AUDIO_KEY, json!({ "audio": "mem://narration", "duration_seconds": 20.0 })),
                (IMAGES_KEY, serde_json::to_value(images).unwrap()),
            ],
        );
        StageContext::new(
            "VideoAssembler",
            RunIdentity::new(),
            inputs,
            Arc::new(CancellationToken::new()),
            store,
            Arc::new(NoOpEventSink),
        )
    }

    #[tokio::test]
    async fn test_drops_unresolvable_images() {
        let store = Arc::new(InMemoryAssetStore::new());
        let first = store.put(b"one".to_vec(), "image/png").await.unwrap();
        let third = store.put(b"three".to_vec(), "image/png").await.unwrap();
        let images = vec![
            JobResultItem::new(0, first),
            JobResultItem::new(1, AssetHandle::new("mem://gone")),
            JobResultItem::new(2, third),
        ];
        let assembler = Arc::new(StaticCapability::new(json!({ "video": "mem://final" })));
        let stage = AssemblyStage::new(assembler.clone());

        let output = stage.run(&context_with(store, images).await).await.unwrap();

        assert_eq!(output.value, json!({ "video": "mem://final" }));
        let seen = &assembler.recorded_inputs()[0];
        assert_eq!(seen[IMAGES_KEY].as_array().unwrap().len(), 2);
        assert_eq!(seen[SCENE_PLAN_KEY]["duration_seconds"], 20.0);
        assert_eq!(seen[SCENE_PLAN_KEY]["scenes"][1]["ordinal"], 2);
        assert!(output.metadata.contains_key(SCENE_PLAN_KEY));
    }

    #[tokio::test]
    async fn test_fails_without_images() {
        let store = Arc::new(InMemoryAssetStore::new());
        let images = vec![JobResultItem::new(0, AssetHandle::new("mem://gone"))];
        let stage = AssemblyStage::new(Arc::new(StaticCapability::new(json!(null))));

        let result = stage.run(&context_with(store, images).await).await;

        assert!(matches!(
            result,
            Err(StageError::Capability(CapabilityError::AssetNotFound(_)))
        ));
    }
}
