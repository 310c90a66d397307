//! Event sink trait and implementations.

use crate::utils::{now, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, Level};
use uuid::Uuid;

/// Lifecycle transitions reported during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// The run started.
    #[serde(rename = "pipeline.started")]
    PipelineStarted,
    /// A stage group started.
    #[serde(rename = "group.started")]
    GroupStarted,
    /// A stage started.
    #[serde(rename = "stage.started")]
    StageStarted,
    /// A stage produced its output.
    #[serde(rename = "stage.completed")]
    StageCompleted,
    /// A stage failed.
    #[serde(rename = "stage.failed")]
    StageFailed,
    /// A stage was skipped because an upstream producer failed.
    #[serde(rename = "stage.skipped")]
    StageSkipped,
    /// A stage group finished and its outputs were merged.
    #[serde(rename = "group.completed")]
    GroupCompleted,
    /// A job stage aggregated its per-ordinal results.
    #[serde(rename = "jobs.aggregated")]
    JobsAggregated,
    /// The run finished (with or without failures).
    #[serde(rename = "pipeline.completed")]
    PipelineCompleted,
    /// The run was cancelled.
    #[serde(rename = "pipeline.cancelled")]
    PipelineCancelled,
}

impl EventKind {
    /// Returns the dotted event type string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PipelineStarted => "pipeline.started",
            Self::GroupStarted => "group.started",
            Self::StageStarted => "stage.started",
            Self::StageCompleted => "stage.completed",
            Self::StageFailed => "stage.failed",
            Self::StageSkipped => "stage.skipped",
            Self::GroupCompleted => "group.completed",
            Self::JobsAggregated => "jobs.aggregated",
            Self::PipelineCompleted => "pipeline.completed",
            Self::PipelineCancelled => "pipeline.cancelled",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// What happened.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// The run the event belongs to.
    pub run_id: Uuid,
    /// Event payload.
    #[serde(default)]
    pub data: serde_json::Value,
    /// When the event was created.
    pub timestamp: Timestamp,
}

impl PipelineEvent {
    /// Creates an event with an empty payload.
    #[must_use]
    pub fn new(kind: EventKind, run_id: Uuid) -> Self {
        Self {
            kind,
            run_id,
            data: serde_json::Value::Object(serde_json::Map::new()),
            timestamp: now(),
        }
    }

    /// Sets the payload.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

/// Trait for event sinks that can receive events.
///
/// Emission must never fail or block the caller; sinks that forward events
/// elsewhere should buffer and drop rather than wait.
pub trait EventSink: Send + Sync {
    /// Emits an event.
    fn emit(&self, event: PipelineEvent);
}

/// A no-op event sink that discards all events.
///
/// Used as the default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit(&self, _event: PipelineEvent) {}
}

/// An event sink that logs events using the tracing framework.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    /// The log level to use.
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a new logging event sink with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl EventSink for LoggingEventSink {
    fn emit(&self, event: PipelineEvent) {
        if self.level == Level::DEBUG {
            debug!(
                event_type = %event.kind,
                run_id = %event.run_id,
                event_data = %event.data,
                "Event: {}", event.kind
            );
        } else {
            info!(
                event_type = %event.kind,
                run_id = %event.run_id,
                event_data = %event.data,
                "Event: {}", event.kind
            );
        }
    }
}

/// A collecting event sink for testing purposes.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::RwLock<Vec<PipelineEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.read().clone()
    }

    /// Returns the kinds of all collected events, in emission order.
    #[must_use]
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.read().iter().map(|e| e.kind).collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns events of one kind.
    #[must_use]
    pub fn events_of_kind(&self, kind: EventKind) -> Vec<PipelineEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&self, event: PipelineEvent) {
        self.events.write().push(event);
    }
}
