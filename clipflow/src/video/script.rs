//! Script generation and script metrics.

use super::TOPIC_KEY;
use crate::capability::GenerationCapability;
use crate::context::StageContext;
use crate::core::StageOutput;
use crate::errors::{CapabilityError, StageError};
use crate::stages::Stage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Narration pace used to estimate duration (about 150 words per minute).
pub const SECONDS_PER_WORD: f64 = 0.4;

/// A script plus the numbers later stages plan with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptMetrics {
    /// The script text, possibly truncated.
    pub script: String,
    /// Whitespace-separated word count.
    pub word_count: usize,
    /// Estimated narration time.
    pub estimated_duration_seconds: f64,
    /// Whether the text was cut to the length limit.
    pub truncated: bool,
}

impl ScriptMetrics {
    /// Measures `text`, truncating it to `max_length` characters.
    #[must_use]
    pub fn from_text(text: &str, max_length: usize) -> Self {
        let text = text.trim();
        let length = text.chars().count();
        let truncated = length > max_length;
        let script: String = if truncated {
            warn!(length, max_length, "Script exceeds max length, truncating");
            text.chars().take(max_length).collect()
        } else {
            text.to_string()
        };

        let word_count = script.split_whitespace().count();
        #[allow(clippy::cast_precision_loss)]
        let estimated_duration_seconds = word_count as f64 * SECONDS_PER_WORD;

        Self {
            script,
            word_count,
            estimated_duration_seconds,
            truncated,
        }
    }
}

/// Calls the script capability and attaches [`ScriptMetrics`].
///
/// The capability may answer with the script text or an object holding it
/// under `script`.
pub struct ScriptStage {
    capability: Arc<dyn GenerationCapability>,
    max_length: usize,
}

impl ScriptStage {
    /// Creates a script stage.
    #[must_use]
    pub fn new(capability: Arc<dyn GenerationCapability>, max_length: usize) -> Self {
        Self {
            capability,
            max_length,
        }
    }
}

impl std::fmt::Debug for ScriptStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptStage")
            .field("max_length", &self.max_length)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for ScriptStage {
    async fn run(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let topic = ctx.inputs().get_str(TOPIC_KEY)?;
        let value = self.capability.invoke(ctx.inputs()).await?;
        let text = value
            .as_str()
            .or_else(|| value.get("script").and_then(serde_json::Value::as_str))
            .ok_or_else(|| CapabilityError::InvalidResponse("expected script text".to_string()))?;
        if text.trim().is_empty() {
            return Err(CapabilityError::InvalidResponse("empty script".to_string()).into());
        }

        let metrics = ScriptMetrics::from_text(text, self.max_length);
        info!(
            topic = %topic,
            words = metrics.word_count,
            estimated_seconds = metrics.estimated_duration_seconds,
            "Script generated"
        );

        let mut output = serde_json::to_value(&metrics).map_err(|e| CapabilityError::Other(e.into()))?;
        if let Some(obj) = output.as_object_mut() {
            obj.insert(TOPIC_KEY.to_string(), serde_json::Value::String(topic.to_string()));
        }
        Ok(StageOutput::new(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StageInputs;
    use crate::testing::{stage_context, StaticCapability};
    use serde_json::json;

    #[test]
    fn test_metrics() {
        let metrics = ScriptMetrics::from_text("  The tide rises twice a day.  ", 500);
        assert_eq!(metrics.script, "The tide rises twice a day.");
        assert_eq!(metrics.word_count, 6);
        assert!((metrics.estimated_duration_seconds - 2.4).abs() < 1e-9);
        assert!(!metrics.truncated);
    }

    #[test]
    fn test_truncation_counts_characters() {
        let metrics = ScriptMetrics::from_text("ébène ébène", 5);
        assert_eq!(metrics.script, "ébène");
        assert_eq!(metrics.word_count, 1);
        assert!(metrics.truncated);
    }

    #[tokio::test]
    async fn test_script_stage_output() {
        let capability = Arc::new(StaticCapability::new(json!({ "script": "Moon pulls the sea." })));
        let stage = ScriptStage::new(capability.clone(), 500);
        let ctx = stage_context("ScriptGenerator", StageInputs::from_pairs("ScriptGenerator", [("topic", json!("tides"))]));

        let output = stage.run(&ctx).await.unwrap();

        assert_eq!(output.value["script"], "Moon pulls the sea.");
        assert_eq!(output.value["word_count"], 4);
        assert_eq!(output.value["topic"], "tides");
        assert_eq!(capability.recorded_inputs(), vec![json!({ "topic": "tides" })]);
    }

    #[tokio::test]
    async fn test_script_stage_rejects_non_text() {
        let stage = ScriptStage::new(Arc::new(StaticCapability::new(json!(42))), 500);
        let ctx = stage_context("ScriptGenerator", StageInputs::from_pairs("ScriptGenerator", [("topic", json!("tides"))]));
        assert!(stage.run(&ctx).await.is_err());
    }
}
