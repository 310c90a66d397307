//! Image prompt generation and parsing.

use super::PROMPTS_KEY;
use crate::capability::GenerationCapability;
use crate::config::VideoConfig;
use crate::context::{StageContext, StageInputs};
use crate::core::StageOutput;
use crate::errors::{CapabilityError, StageError};
use crate::poller::JobSpec;
use crate::stages::{JobPlanner, Stage};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

/// Style appended to every prompt before image generation.
pub const PRODUCTION_STYLE: &str = "cinematic style, high quality, detailed, professional video production";

/// Leading list numbering such as `1.`, `2)` or `3 `.
static NUMBERING: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^\d+(?:[.)]\s*|\s+)").ok());

/// Splits generated text into at most `limit` prompts.
///
/// Blank lines are dropped and list numbering is stripped.
#[must_use]
pub fn parse_prompt_list(text: &str, limit: usize) -> Vec<String> {
    let prompts: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| strip_numbering(line).trim().to_string())
        .filter(|line| !line.is_empty())
        .collect();

    if prompts.len() < limit {
        warn!(found = prompts.len(), expected = limit, "Fewer prompts than requested");
    }
    prompts.into_iter().take(limit).collect()
}

fn strip_numbering(line: &str) -> &str {
    NUMBERING
        .as_ref()
        .and_then(|re| re.find(line))
        .map_or(line, |m| &line[m.end()..])
}

/// Appends the production style to a prompt.
#[must_use]
pub fn enhance_prompt(prompt: &str) -> String {
    format!("{prompt}, {PRODUCTION_STYLE}")
}

/// The value a [`PromptStage`] merges into shared state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptList {
    /// Prompts in ordinal order.
    pub prompts: Vec<String>,
    /// Number of prompts.
    pub num_prompts: usize,
}

/// Asks a capability for image prompts and normalizes the answer.
///
/// The capability may answer with plain text (one prompt per line), an array
/// of strings, or an object with a `prompts` field holding either.
pub struct PromptStage {
    capability: Arc<dyn GenerationCapability>,
    image_count: usize,
}

impl PromptStage {
    /// Creates a prompt stage producing up to `image_count` prompts.
    #[must_use]
    pub fn new(capability: Arc<dyn GenerationCapability>, image_count: usize) -> Self {
        Self {
            capability,
            image_count,
        }
    }

    fn normalize(&self, value: &serde_json::Value) -> Result<Vec<String>, CapabilityError> {
        let value = value.get("prompts").unwrap_or(value);
        match value {
            serde_json::Value::String(text) => Ok(parse_prompt_list(text, self.image_count)),
            serde_json::Value::Array(items) => {
                let lines: Vec<&str> = items.iter().filter_map(serde_json::Value::as_str).collect();
                Ok(parse_prompt_list(&lines.join("\n"), self.image_count))
            }
            other => Err(CapabilityError::InvalidResponse(format!(
                "expected prompt text or list, got {other}"
            ))),
        }
    }
}

impl std::fmt::Debug for PromptStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptStage")
            .field("image_count", &self.image_count)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for PromptStage {
    async fn run(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let value = self.capability.invoke(ctx.inputs()).await?;
        let prompts = self.normalize(&value)?;
        if prompts.is_empty() {
            return Err(CapabilityError::InvalidResponse("no prompts generated".to_string()).into());
        }
        debug!(stage = %ctx.stage_name(), count = prompts.len(), "Prompts generated");
        Ok(StageOutput::new(json!(PromptList {
            num_prompts: prompts.len(),
            prompts,
        })))
    }
}

/// Plans one image job per prompt.
#[derive(Debug, Clone)]
pub struct ImagePromptPlanner {
    width: u32,
    height: u32,
}

impl ImagePromptPlanner {
    /// Creates a planner for the configured frame size.
    #[must_use]
    pub fn new(video: &VideoConfig) -> Self {
        Self {
            width: video.width,
            height: video.height,
        }
    }
}

impl JobPlanner for ImagePromptPlanner {
    fn plan(&self, inputs: &StageInputs) -> Result<JobSpec, CapabilityError> {
        let list: PromptList = inputs.get_as(PROMPTS_KEY)?;
        if list.prompts.is_empty() {
            return Err(CapabilityError::invalid_input(PROMPTS_KEY, "no prompts to render"));
        }
        Ok(JobSpec::from_payloads(list.prompts.iter().map(|prompt| {
            json!({
                "prompt": enhance_prompt(prompt),
                "original_prompt": prompt,
                "width": self.width,
                "height": self.height,
            })
        })))
    }
}
