//! The context a stage runs in.

use super::{RunIdentity, StageInputs};
use crate::cancellation::CancellationToken;
use crate::capability::AssetStore;
use crate::events::{EventKind, EventSink, PipelineEvent};
use std::sync::Arc;

/// Everything a stage may see while it runs.
///
/// Stages never touch shared state directly: they read their declared
/// inputs and return a value for the executor to merge.
#[derive(Clone)]
pub struct StageContext {
    stage_name: String,
    run: RunIdentity,
    inputs: StageInputs,
    cancel: Arc<CancellationToken>,
    assets: Arc<dyn AssetStore>,
    events: Arc<dyn EventSink>,
}

impl StageContext {
    /// Creates a new stage context.
    #[must_use]
    pub fn new(
        stage_name: impl Into<String>,
        run: RunIdentity,
        inputs: StageInputs,
        cancel: Arc<CancellationToken>,
        assets: Arc<dyn AssetStore>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            stage_name: stage_name.into(),
            run,
            inputs,
            cancel,
            assets,
            events,
        }
    }

    /// Returns the stage name.
    #[must_use]
    pub fn stage_name(&self) -> &str {
        &self.stage_name
    }

    /// Returns the run identity.
    #[must_use]
    pub fn run(&self) -> &RunIdentity {
        &self.run
    }

    /// Returns the declared inputs.
    #[must_use]
    pub fn inputs(&self) -> &StageInputs {
        &self.inputs
    }

    /// Returns the run's cancellation token.
    #[must_use]
    pub fn cancel_token(&self) -> &Arc<CancellationToken> {
        &self.cancel
    }

    /// Checks if the run is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Returns the asset store.
    #[must_use]
    pub fn assets(&self) -> &Arc<dyn AssetStore> {
        &self.assets
    }

    /// Emits an event tagged with this run and stage.
    pub fn emit(&self, kind: EventKind, mut data: serde_json::Value) {
        if let Some(obj) = data.as_object_mut() {
            obj.entry("stage")
                .or_insert_with(|| serde_json::Value::String(self.stage_name.clone()));
        }
        self.events.emit(PipelineEvent::new(kind, self.run.run_id).with_data(data));
    }
}

impl std::fmt::Debug for StageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageContext")
            .field("stage_name", &self.stage_name)
            .field("run_id", &self.run.run_id)
            .field("inputs", &self.inputs.declared())
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::InMemoryAssetStore;
    use crate::events::CollectingEventSink;
    use serde_json::json;

    #[test]
    fn test_emit_tags_stage() {
        let sink = Arc::new(CollectingEventSink::new());
        let ctx = StageContext::new(
            "ImageCreator",
            RunIdentity::new(),
            StageInputs::default(),
            Arc::new(CancellationToken::new()),
            Arc::new(InMemoryAssetStore::new()),
            sink.clone(),
        );

        ctx.emit(EventKind::JobsAggregated, json!({"succeeded": 3}));

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::JobsAggregated);
        assert_eq!(events[0].data["stage"], "ImageCreator");
        assert_eq!(events[0].run_id, ctx.run().run_id);
    }

    #[test]
    fn test_cancellation_visible() {
        let token = Arc::new(CancellationToken::new());
        let ctx = StageContext::new(
            "S",
            RunIdentity::new(),
            StageInputs::default(),
            token.clone(),
            Arc::new(InMemoryAssetStore::new()),
            Arc::new(CollectingEventSink::new()),
        );
        assert!(!ctx.is_cancelled());
        token.cancel("stop");
        assert!(ctx.is_cancelled());
    }
}
