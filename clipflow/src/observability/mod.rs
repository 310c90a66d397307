//! Observability utilities.
//!
//! Run progress is reported two ways: `tracing` spans and events for
//! operators, and [`crate::events`] for programmatic consumers.

mod logging;

pub use logging::{build_filter, init_logging};
#[cfg(test)]
pub use logging::init_test_logging;
