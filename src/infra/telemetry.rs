use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Directives in this variable refine the configured level, e.g.
/// `IMPRINT_LOG=imprint::application::render=debug`.
pub const LOG_FILTER_ENV: &str = "IMPRINT_LOG";

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .with_env_var(LOG_FILTER_ENV)
        .from_env_lossy();

    // Renders run on the blocking pool; thread names tell them apart.
    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_thread_names(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_thread_names(true)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "imprint_render_committed_total",
            Unit::Count,
            "Total number of rendered pages handed to the output sink."
        );
        describe_counter!(
            "imprint_render_failed_total",
            Unit::Count,
            "Total number of renders that ended in an error."
        );
        describe_counter!(
            "imprint_render_coalesced_total",
            Unit::Count,
            "Total number of change signals folded into an in-flight render."
        );
        describe_counter!(
            "imprint_render_discarded_total",
            Unit::Count,
            "Total number of render results dropped because a newer generation was already committed."
        );
        describe_gauge!(
            "imprint_render_in_flight",
            Unit::Count,
            "Current number of render keys being built or rendered."
        );
        describe_histogram!(
            "imprint_render_ms",
            Unit::Milliseconds,
            "Template compile and render latency in milliseconds."
        );
        describe_histogram!(
            "imprint_snapshot_build_ms",
            Unit::Milliseconds,
            "Snapshot construction latency in milliseconds."
        );
    });
}
