//! provides logging helpers

use tracing_subscriber::filter::FilterExt;
use tracing_subscriber::filter::{self};
use tracing_subscriber::fmt::layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;

/// Target used by the log backend for metric events.
pub const METRICS_TARGET: &str = "metrics";

fn env_filter() -> filter::EnvFilter {
    filter::EnvFilter::builder()
        .with_default_directive(filter::LevelFilter::INFO.into())
        .from_env_lossy()
}

fn is_metrics_event(metadata: &tracing::Metadata<'_>) -> bool {
    metadata.target().starts_with(METRICS_TARGET)
}

/// initiate the global tracing subscriber
///
/// Diagnostics go to stderr, metric events emitted under [`METRICS_TARGET`]
/// go to stdout so they can be piped separately.
pub fn init() {
    let diagnostics = layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(env_filter().and(filter::filter_fn(|metadata| !is_metrics_event(metadata))));

    let metrics = layer()
        .with_writer(std::io::stdout)
        .with_target(false)
        .with_ansi(false)
        .with_filter(filter::filter_fn(is_metrics_event));

    registry().with(diagnostics).with(metrics).init();
}
