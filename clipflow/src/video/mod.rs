//! The topic-to-video pipeline.
//!
//! Four groups, in order:
//!
//! 1. `ScriptGenerator` writes the script from the topic.
//! 2. `AudioNarrator` and `PromptGenerator` run in parallel off the script.
//! 3. `ImageCreator` renders one image job per prompt through the poller.
//! 4. `VideoAssembler` combines narration, images and script.

mod assembly;
mod prompts;
mod scenes;
mod script;

pub use assembly::{AssemblyStage, SCENE_PLAN_KEY};
pub use prompts::{
    enhance_prompt, parse_prompt_list, ImagePromptPlanner, PromptList, PromptStage, PRODUCTION_STYLE,
};
pub use scenes::{Scene, ScenePlan};
pub use script::{ScriptMetrics, ScriptStage, SECONDS_PER_WORD};

use crate::cancellation::CancellationToken;
use crate::capability::{AssetStore, AsyncJobCapability, GenerationCapability, RetryPolicy, RetryingCapability};
use crate::config::PipelineConfig;
use crate::context::RESERVED_INPUT_KEY;
use crate::errors::ClipflowError;
use crate::pipeline::{Pipeline, PipelineBuilder, PipelineDescription, PipelineOutcome, StageDescriptor};
use crate::stages::{CapabilityStage, JobStage};
use std::sync::Arc;

/// Writes the script from the topic.
pub const SCRIPT_GENERATOR: &str = "ScriptGenerator";
/// Narrates the script.
pub const AUDIO_NARRATOR: &str = "AudioNarrator";
/// Turns the script into image prompts.
pub const PROMPT_GENERATOR: &str = "PromptGenerator";
/// Renders one image per prompt.
pub const IMAGE_CREATOR: &str = "ImageCreator";
/// Combines narration, images and script.
pub const VIDEO_ASSEMBLER: &str = "VideoAssembler";

/// Name of the parallel narration/prompt group.
pub const NARRATION_AND_PROMPTS: &str = "NarrationAndPrompts";

/// The run input.
pub const TOPIC_KEY: &str = RESERVED_INPUT_KEY;
/// Output of [`SCRIPT_GENERATOR`].
pub const SCRIPT_KEY: &str = "script_data";
/// Output of [`AUDIO_NARRATOR`].
pub const AUDIO_KEY: &str = "audio_data";
/// Output of [`PROMPT_GENERATOR`].
pub const PROMPTS_KEY: &str = "prompts_data";
/// Output of [`IMAGE_CREATOR`].
pub const IMAGES_KEY: &str = "images_data";
/// Output of [`VIDEO_ASSEMBLER`].
pub const VIDEO_KEY: &str = "final_video";

/// The external services the video pipeline drives.
#[derive(Clone)]
pub struct VideoCapabilities {
    /// Writes the script.
    pub script: Arc<dyn GenerationCapability>,
    /// Narrates the script.
    pub narration: Arc<dyn GenerationCapability>,
    /// Writes image prompts.
    pub prompts: Arc<dyn GenerationCapability>,
    /// Renders images as long-running jobs.
    pub images: Arc<dyn AsyncJobCapability>,
    /// Assembles the final video.
    pub assembler: Arc<dyn GenerationCapability>,
    /// Where audio, images and video live.
    pub assets: Arc<dyn AssetStore>,
}

impl std::fmt::Debug for VideoCapabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoCapabilities").finish_non_exhaustive()
    }
}

fn with_retries(
    capability: &Arc<dyn GenerationCapability>,
    policy: &RetryPolicy,
    label: &str,
) -> Arc<dyn GenerationCapability> {
    Arc::new(RetryingCapability::new(Arc::clone(capability), policy.clone()).with_label(label))
}

/// Declares the video pipeline on a builder, leaving sinks open for the caller.
///
/// # Errors
///
/// Returns `ClipflowError::Config` if `config` is invalid.
pub fn video_pipeline_builder(
    capabilities: &VideoCapabilities,
    config: &PipelineConfig,
) -> Result<PipelineBuilder, ClipflowError> {
    config.validate()?;
    let retry = config.retry.policy()?;
    let budget = config.images.budget()?;

    let script = StageDescriptor::new(
        SCRIPT_GENERATOR,
        &[TOPIC_KEY],
        SCRIPT_KEY,
        Arc::new(ScriptStage::new(
            with_retries(&capabilities.script, &retry, SCRIPT_GENERATOR),
            config.video.max_script_length,
        )),
    );
    let narration = StageDescriptor::new(
        AUDIO_NARRATOR,
        &[SCRIPT_KEY],
        AUDIO_KEY,
        Arc::new(CapabilityStage::new(with_retries(&capabilities.narration, &retry, AUDIO_NARRATOR))),
    );
    let prompts = StageDescriptor::new(
        PROMPT_GENERATOR,
        &[SCRIPT_KEY],
        PROMPTS_KEY,
        Arc::new(PromptStage::new(
            with_retries(&capabilities.prompts, &retry, PROMPT_GENERATOR),
            config.video.image_count,
        )),
    );
    let images = StageDescriptor::new(
        IMAGE_CREATOR,
        &[PROMPTS_KEY],
        IMAGES_KEY,
        Arc::new(
            JobStage::new(
                Arc::clone(&capabilities.images),
                Arc::new(ImagePromptPlanner::new(&config.video)),
            )
            .with_budget(budget)
            .with_resubmit_rounds(config.images.resubmit_rounds),
        ),
    );
    let assembly = StageDescriptor::new(
        VIDEO_ASSEMBLER,
        &[AUDIO_KEY, IMAGES_KEY, SCRIPT_KEY],
        VIDEO_KEY,
        Arc::new(AssemblyStage::new(with_retries(&capabilities.assembler, &retry, VIDEO_ASSEMBLER))),
    );

    Ok(PipelineBuilder::new(&config.name)
        .with_config(config)
        .with_asset_store(Arc::clone(&capabilities.assets))
        .stage(script)
        .parallel(NARRATION_AND_PROMPTS, vec![narration, prompts])
        .stage(images)
        .stage(assembly))
}

/// The topic-to-video pipeline with its default sinks.
#[derive(Debug, Clone)]
pub struct VideoPipeline {
    pipeline: Pipeline,
}

impl VideoPipeline {
    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns `ClipflowError::Config` for an invalid configuration and
    /// `ClipflowError::Validation` if the declared stages do not validate.
    pub fn new(capabilities: &VideoCapabilities, config: &PipelineConfig) -> Result<Self, ClipflowError> {
        let pipeline = video_pipeline_builder(capabilities, config)?.build()?;
        Ok(Self { pipeline })
    }

    /// Generates a video for `topic`.
    pub async fn generate(&self, topic: &str, cancel: Arc<CancellationToken>) -> PipelineOutcome {
        self.pipeline.run(serde_json::Value::String(topic.to_string()), cancel).await
    }

    /// Returns the underlying pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Returns a serializable summary of the pipeline.
    #[must_use]
    pub fn describe(&self) -> PipelineDescription {
        self.pipeline.describe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::InMemoryAssetStore;
    use crate::config::JobStageConfig;
    use crate::core::{FailureCause, JobResultItem};
    use crate::events::{CollectingEventSink, EventKind};
    use crate::pipeline::RunStatus;
    use crate::testing::{
        assert_job_failures, assert_ordinals, assert_state_keys, assert_status, FailingCapability,
        ScriptStep, ScriptedJobCapability, StaticCapability,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct Fixture {
        capabilities: VideoCapabilities,
        assembler: Arc<StaticCapability>,
        jobs: Arc<ScriptedJobCapability>,
    }

    fn fixture(jobs: ScriptedJobCapability) -> Fixture {
        let store = Arc::new(InMemoryAssetStore::new());
        let jobs = Arc::new(jobs.with_asset_store(Arc::clone(&store)));
        let assembler = Arc::new(StaticCapability::new(json!({ "video": "mem://final", "duration_seconds": 12.0 })));
        let capabilities = VideoCapabilities {
            script: Arc::new(StaticCapability::new(json!("The moon pulls the sea. Tides follow."))),
            narration: Arc::new(StaticCapability::new(json!({ "audio": "mem://narration", "duration_seconds": 12.0 }))),
            prompts: Arc::new(StaticCapability::new(json!(
                "1. Full moon over the ocean\n2. Waves rising on a beach\n3. Tide pool at low tide\n4. Harbor boats resting on mud"
            ))),
            images: jobs.clone(),
            assembler: assembler.clone(),
            assets: store,
        };
        Fixture {
            capabilities,
            assembler,
            jobs,
        }
    }

    fn fast_config() -> PipelineConfig {
        PipelineConfig::default().with_images(
            JobStageConfig::default()
                .with_poll_interval(1.0)
                .with_timeout(20.0),
        )
    }

    #[test]
    fn test_topology() {
        let video = VideoPipeline::new(&fixture(ScriptedJobCapability::new()).capabilities, &PipelineConfig::default()).unwrap();
        let description = video.describe();

        assert_eq!(description.name, "VideoGenerationPipeline");
        let groups: Vec<(&str, &str, Vec<&str>)> = description
            .groups
            .iter()
            .map(|g| (g.name.as_str(), g.mode.as_str(), g.stages.iter().map(|s| s.name.as_str()).collect()))
            .collect();
        assert_eq!(
            groups,
            vec![
                (SCRIPT_GENERATOR, "sequential", vec![SCRIPT_GENERATOR]),
                (NARRATION_AND_PROMPTS, "parallel", vec![AUDIO_NARRATOR, PROMPT_GENERATOR]),
                (IMAGE_CREATOR, "sequential", vec![IMAGE_CREATOR]),
                (VIDEO_ASSEMBLER, "sequential", vec![VIDEO_ASSEMBLER]),
            ]
        );
        assert_eq!(description.groups[3].stages[0].inputs, vec![AUDIO_KEY, IMAGES_KEY, SCRIPT_KEY]);
        assert!(video.pipeline().check_dependencies().is_ok());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PipelineConfig::default().with_image_count(0);
        let result = VideoPipeline::new(&fixture(ScriptedJobCapability::new()).capabilities, &config);
        assert!(matches!(result, Err(ClipflowError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_generates_video() {
        let fixture = fixture(ScriptedJobCapability::new().with_script(2, vec![ScriptStep::Running, ScriptStep::SucceedAll]));
        let sink = Arc::new(CollectingEventSink::new());
        let pipeline = video_pipeline_builder(&fixture.capabilities, &fast_config())
            .unwrap()
            .with_event_sink(sink.clone())
            .build()
            .unwrap();

        let outcome = pipeline.run_topic("tides").await;

        assert_status(&outcome, RunStatus::Completed);
        assert_state_keys(&outcome, &[TOPIC_KEY, SCRIPT_KEY, AUDIO_KEY, PROMPTS_KEY, IMAGES_KEY, VIDEO_KEY]);
        assert_eq!(outcome.state.get(VIDEO_KEY), Some(&json!({ "video": "mem://final", "duration_seconds": 12.0 })));

        let submitted: Vec<String> = fixture
            .jobs
            .submissions()
            .iter()
            .map(|s| s.requests[0].payload["prompt"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(submitted.len(), 4);
        assert!(submitted.iter().all(|p| p.ends_with(PRODUCTION_STYLE)));

        let seen = &fixture.assembler.recorded_inputs()[0];
        assert_eq!(seen[SCENE_PLAN_KEY]["scenes"].as_array().unwrap().len(), 4);
        assert_eq!(seen[SCRIPT_KEY]["word_count"], 7);
        assert_eq!(sink.events_of_kind(EventKind::JobsAggregated)[0].data["total"], 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_of_four_images_still_assembles() {
        let fixture = fixture(ScriptedJobCapability::new().with_script(3, vec![ScriptStep::Pending]));
        let video = VideoPipeline::new(&fixture.capabilities, &fast_config()).unwrap();

        let outcome = video.generate("tides", Arc::new(CancellationToken::new())).await;

        assert_status(&outcome, RunStatus::CompletedWithFailures);
        assert_job_failures(&outcome, IMAGE_CREATOR, &[(3, FailureCause::Timeout)]);
        let images: Vec<JobResultItem> = serde_json::from_value(outcome.state.get(IMAGES_KEY).cloned().unwrap()).unwrap();
        assert_ordinals(&images, &[0, 1, 2]);
        let seen = &fixture.assembler.recorded_inputs()[0];
        assert_eq!(seen[IMAGES_KEY].as_array().unwrap().len(), 3);
        assert!(outcome.state.contains_key(VIDEO_KEY));
    }

    #[tokio::test]
    async fn test_narration_failure_fails_group_but_keeps_prompts() {
        let mut fixture = fixture(ScriptedJobCapability::new());
        fixture.capabilities.narration = Arc::new(FailingCapability::rejected("voice unavailable"));
        let video = VideoPipeline::new(&fixture.capabilities, &PipelineConfig::default()).unwrap();

        let outcome = video.generate("tides", Arc::new(CancellationToken::new())).await;

        assert_status(&outcome, RunStatus::Failed);
        assert_state_keys(&outcome, &[TOPIC_KEY, SCRIPT_KEY, PROMPTS_KEY]);
        assert_eq!(outcome.failed_stages(), vec![AUDIO_NARRATOR]);
        assert!(fixture.jobs.submissions().is_empty());
    }
}
