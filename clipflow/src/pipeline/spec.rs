//! Pipeline declarations: stage descriptors and stage groups.

use crate::stages::Stage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A stage as declared in a pipeline.
///
/// Immutable once the pipeline is built.
#[derive(Debug, Clone)]
pub struct StageDescriptor {
    /// Unique stage name.
    pub name: String,
    /// Shared state keys the stage reads, in order.
    pub inputs: Vec<String>,
    /// The single key the stage's value is merged under.
    pub output: String,
    /// The implementation.
    pub stage: Arc<dyn Stage>,
}

impl StageDescriptor {
    /// Creates a stage descriptor.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        inputs: &[&str],
        output: impl Into<String>,
        stage: Arc<dyn Stage>,
    ) -> Self {
        Self {
            name: name.into(),
            inputs: inputs.iter().map(|s| (*s).to_string()).collect(),
            output: output.into(),
            stage,
        }
    }

    fn describe(&self) -> StageDescription {
        StageDescription {
            name: self.name.clone(),
            inputs: self.inputs.clone(),
            output: self.output.clone(),
        }
    }
}

/// An ordered unit of execution.
#[derive(Debug, Clone)]
pub enum StageGroup {
    /// Members run one after another; each sees earlier members' outputs.
    Sequential {
        /// Group name.
        name: String,
        /// Members in execution order.
        stages: Vec<StageDescriptor>,
    },
    /// Members run concurrently against one snapshot; outputs merge in declared order.
    Parallel {
        /// Group name.
        name: String,
        /// Members in merge order.
        stages: Vec<StageDescriptor>,
    },
}

impl StageGroup {
    /// Returns the group name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Sequential { name, .. } | Self::Parallel { name, .. } => name,
        }
    }

    /// Returns the members in declared order.
    #[must_use]
    pub fn stages(&self) -> &[StageDescriptor] {
        match self {
            Self::Sequential { stages, .. } | Self::Parallel { stages, .. } => stages,
        }
    }

    /// Returns true for parallel groups.
    #[must_use]
    pub fn is_parallel(&self) -> bool {
        matches!(self, Self::Parallel { .. })
    }

    /// Returns the execution mode as a string.
    #[must_use]
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Sequential { .. } => "sequential",
            Self::Parallel { .. } => "parallel",
        }
    }

    pub(crate) fn describe(&self) -> GroupDescription {
        GroupDescription {
            name: self.name().to_string(),
            mode: self.mode().to_string(),
            stages: self.stages().iter().map(StageDescriptor::describe).collect(),
        }
    }
}

/// Serializable summary of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDescription {
    /// Stage name.
    pub name: String,
    /// Declared inputs.
    pub inputs: Vec<String>,
    /// Output key.
    pub output: String,
}

/// Serializable summary of one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDescription {
    /// Group name.
    pub name: String,
    /// `sequential` or `parallel`.
    pub mode: String,
    /// Members in declared order.
    pub stages: Vec<StageDescription>,
}

/// Serializable summary of a whole pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDescription {
    /// Pipeline name.
    pub name: String,
    /// Groups in execution order.
    pub groups: Vec<GroupDescription>,
}

impl PipelineDescription {
    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.groups.iter().map(|g| g.stages.len()).sum()
    }
}
