//! Pipeline builder with validation.

use super::{FailureMode, Pipeline, StageDescriptor, StageGroup};
use crate::capability::{AssetStore, InMemoryAssetStore};
use crate::config::PipelineConfig;
use crate::context::RESERVED_INPUT_KEY;
use crate::errors::{ContractErrorInfo, PipelineValidationError};
use crate::events::{EventSink, NoOpEventSink};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Builder for creating validated pipelines.
#[derive(Clone)]
pub struct PipelineBuilder {
    name: String,
    groups: Vec<StageGroup>,
    failure_mode: FailureMode,
    events: Arc<dyn EventSink>,
    assets: Arc<dyn AssetStore>,
    run_deadline: Option<Duration>,
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("name", &self.name)
            .field("groups", &self.groups.len())
            .field("failure_mode", &self.failure_mode)
            .field("run_deadline", &self.run_deadline)
            .finish_non_exhaustive()
    }
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            groups: Vec::new(),
            failure_mode: FailureMode::default(),
            events: Arc::new(NoOpEventSink),
            assets: Arc::new(InMemoryAssetStore::new()),
            run_deadline: None,
        }
    }

    /// Adds a single stage as its own sequential group.
    #[must_use]
    pub fn stage(self, stage: StageDescriptor) -> Self {
        let name = stage.name.clone();
        self.sequential(name, vec![stage])
    }

    /// Adds a sequential group.
    #[must_use]
    pub fn sequential(mut self, name: impl Into<String>, stages: Vec<StageDescriptor>) -> Self {
        self.groups.push(StageGroup::Sequential {
            name: name.into(),
            stages,
        });
        self
    }

    /// Adds a parallel group.
    #[must_use]
    pub fn parallel(mut self, name: impl Into<String>, stages: Vec<StageDescriptor>) -> Self {
        self.groups.push(StageGroup::Parallel {
            name: name.into(),
            stages,
        });
        self
    }

    /// Sets the failure mode.
    #[must_use]
    pub fn with_failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sets the asset store handed to stages.
    #[must_use]
    pub fn with_asset_store(mut self, assets: Arc<dyn AssetStore>) -> Self {
        self.assets = assets;
        self
    }

    /// Cancels every run that takes longer than `deadline`.
    #[must_use]
    pub fn with_run_deadline(mut self, deadline: Duration) -> Self {
        self.run_deadline = Some(deadline);
        self
    }

    /// Applies the run-level settings of a configuration.
    #[must_use]
    pub fn with_config(mut self, config: &PipelineConfig) -> Self {
        self.failure_mode = config.failure_mode;
        self.run_deadline = config.run_deadline();
        self
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages declared so far.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.groups.iter().map(|g| g.stages().len()).sum()
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline or a group is empty, a stage name is
    /// reused, an output key is claimed twice or collides with the reserved
    /// input key, or a parallel member reads a sibling's output.
    pub fn build(self) -> Result<Pipeline, PipelineValidationError> {
        if self.groups.is_empty() {
            return Err(PipelineValidationError::new("Pipeline has no stages")
                .with_error_info(
                    ContractErrorInfo::new("CONTRACT-EMPTY-PIPELINE", "Cannot build an empty pipeline")
                        .with_fix_hint("Add at least one stage group before building."),
                ));
        }

        let mut names = HashSet::new();
        let mut producers: IndexMap<String, String> = IndexMap::new();

        for group in &self.groups {
            if group.stages().is_empty() {
                return Err(PipelineValidationError::new(format!(
                    "Group '{}' has no stages",
                    group.name()
                ))
                .with_error_info(
                    ContractErrorInfo::new("CONTRACT-EMPTY-GROUP", "Groups must contain at least one stage")
                        .with_context_entry("group", group.name()),
                ));
            }

            for stage in group.stages() {
                if !names.insert(stage.name.clone()) {
                    return Err(PipelineValidationError::new(format!(
                        "Stage '{}' is declared more than once",
                        stage.name
                    ))
                    .with_stages(vec![stage.name.clone()])
                    .with_error_info(
                        ContractErrorInfo::new("CONTRACT-DUPLICATE-STAGE", "Stage names must be unique")
                            .with_fix_hint("Rename one of the stages."),
                    ));
                }

                if stage.output == RESERVED_INPUT_KEY {
                    return Err(PipelineValidationError::new(format!(
                        "Stage '{}' writes the reserved key '{RESERVED_INPUT_KEY}'",
                        stage.name
                    ))
                    .with_stages(vec![stage.name.clone()])
                    .with_error_info(
                        ContractErrorInfo::new(
                            "CONTRACT-RESERVED-KEY",
                            format!("'{RESERVED_INPUT_KEY}' holds the run input"),
                        )
                        .with_fix_hint("Choose a different output key."),
                    ));
                }

                if let Some(owner) = producers.get(&stage.output) {
                    return Err(PipelineValidationError::new(format!(
                        "Output key '{}' is produced by both '{}' and '{}'",
                        stage.output, owner, stage.name
                    ))
                    .with_stages(vec![owner.clone(), stage.name.clone()])
                    .with_error_info(
                        ContractErrorInfo::new("CONTRACT-OUTPUT-CONFLICT", "Each output key has one producer")
                            .with_context_entry("key", stage.output.clone()),
                    ));
                }
                producers.insert(stage.output.clone(), stage.name.clone());
            }

            if group.is_parallel() {
                check_parallel_independence(group)?;
            }
        }

        Ok(Pipeline {
            name: self.name,
            groups: self.groups,
            failure_mode: self.failure_mode,
            events: self.events,
            assets: self.assets,
            run_deadline: self.run_deadline,
            producers,
        })
    }
}

fn check_parallel_independence(group: &StageGroup) -> Result<(), PipelineValidationError> {
    let outputs: IndexMap<&str, &str> = group
        .stages()
        .iter()
        .map(|s| (s.output.as_str(), s.name.as_str()))
        .collect();

    for stage in group.stages() {
        if let Some(sibling) = stage.inputs.iter().find_map(|key| outputs.get(key.as_str())) {
            return Err(PipelineValidationError::new(format!(
                "Stage '{}' reads the output of '{}' in the same parallel group '{}'",
                stage.name,
                sibling,
                group.name()
            ))
            .with_stages(vec![stage.name.clone(), (*sibling).to_string()])
            .with_error_info(
                ContractErrorInfo::new(
                    "CONTRACT-PARALLEL-DEPENDENCY",
                    "Parallel members only see state from earlier groups",
                )
                .with_fix_hint("Move the dependent stage into a later group."),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StageContext;
    use crate::core::StageOutput;
    use crate::stages::{FnStage, Stage};
    use serde_json::json;

    fn noop(name: &str) -> Arc<dyn Stage> {
        Arc::new(FnStage::new(name, |_ctx: &StageContext| Ok(StageOutput::new(json!(null)))))
    }

    fn desc(name: &str, inputs: &[&str], output: &str) -> StageDescriptor {
        StageDescriptor::new(name, inputs, output, noop(name))
    }

    #[test]
    fn test_builder_creation() {
        let builder = PipelineBuilder::new("test");
        assert_eq!(builder.name(), "test");
        assert_eq!(builder.stage_count(), 0);
    }

    #[test]
    fn test_builder_build_success() {
        let pipeline = PipelineBuilder::new("test")
            .stage(desc("a", &["topic"], "a_out"))
            .parallel("fan", vec![desc("b", &["a_out"], "b_out"), desc("c", &["a_out"], "c_out")])
            .build()
            .unwrap();

        assert_eq!(pipeline.name(), "test");
        assert_eq!(pipeline.describe().stage_count(), 3);
        assert_eq!(pipeline.producer_of("c_out"), Some("c"));
    }

    #[test]
    fn test_builder_empty_build() {
        let err = PipelineBuilder::new("test").build().unwrap_err();
        assert_eq!(err.code(), Some("CONTRACT-EMPTY-PIPELINE"));
    }

    #[test]
    fn test_builder_empty_group() {
        let err = PipelineBuilder::new("test")
            .parallel("nothing", Vec::new())
            .build()
            .unwrap_err();
        assert_eq!(err.code(), Some("CONTRACT-EMPTY-GROUP"));
    }

    #[test]
    fn test_builder_duplicate_stage() {
        let err = PipelineBuilder::new("test")
            .stage(desc("a", &[], "x"))
            .stage(desc("a", &[], "y"))
            .build()
            .unwrap_err();
        assert_eq!(err.code(), Some("CONTRACT-DUPLICATE-STAGE"));
        assert_eq!(err.stages, vec!["a".to_string()]);
    }

    #[test]
    fn test_builder_output_conflict() {
        let err = PipelineBuilder::new("test")
            .stage(desc("a", &[], "x"))
            .stage(desc("b", &[], "x"))
            .build()
            .unwrap_err();
        assert_eq!(err.code(), Some("CONTRACT-OUTPUT-CONFLICT"));
        assert_eq!(err.stages, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_builder_reserved_key() {
        let err = PipelineBuilder::new("test")
            .stage(desc("a", &[], RESERVED_INPUT_KEY))
            .build()
            .unwrap_err();
        assert_eq!(err.code(), Some("CONTRACT-RESERVED-KEY"));
    }

    #[test]
    fn test_builder_parallel_dependency() {
        let err = PipelineBuilder::new("test")
            .parallel("fan", vec![desc("a", &[], "x"), desc("b", &["x"], "y")])
            .build()
            .unwrap_err();
        assert_eq!(err.code(), Some("CONTRACT-PARALLEL-DEPENDENCY"));
    }

    #[test]
    fn test_builder_allows_forward_reference() {
        // Dependencies are checked when the run reaches the group.
        let pipeline = PipelineBuilder::new("test")
            .stage(desc("a", &["later"], "x"))
            .stage(desc("b", &[], "later"))
            .build();
        assert!(pipeline.is_ok());
    }

    #[test]
    fn test_builder_with_config() {
        let config = PipelineConfig::default()
            .with_failure_mode(FailureMode::ContinueOnFailure)
            .with_run_deadline_seconds(90.0);

        let pipeline = PipelineBuilder::new("test")
            .with_config(&config)
            .stage(desc("a", &[], "x"))
            .build()
            .unwrap();

        assert_eq!(pipeline.failure_mode(), FailureMode::ContinueOnFailure);
        assert_eq!(pipeline.run_deadline(), Some(Duration::from_secs(90)));
    }
}
