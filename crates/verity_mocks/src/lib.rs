pub mod grader;
pub mod util;

use std::sync::Once;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static TRACING_INIT: Once = Once::new();

pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        // LOG_LEVEL drives the filter, "info" when unset
        let filter =
            EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info"));

        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .with_test_writer();

        // another test harness may already own the global subscriber
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init();

        tracing::debug!("Tracing initialized successfully");
    });
}

pub use grader::{GradeCall, MockGrader};
pub use util::{
    build_tree, create_nested_trace, create_sequence_pattern_trace, create_simple_trace,
    create_trace_with_attributes, SpanBuilder,
};
