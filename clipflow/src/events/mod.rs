//! Event sink system for observability.
//!
//! The executor and job stages report lifecycle transitions as
//! [`PipelineEvent`]s. A sink decides what to do with them: drop them, log
//! them through `tracing`, or collect them for assertions in tests.

mod sink;

pub use sink::{
    CollectingEventSink, EventKind, EventSink, LoggingEventSink, NoOpEventSink, PipelineEvent,
};
