use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::render::metrics as render_metrics;
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
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

/// Register descriptions for every metric the engine emits. Safe to call repeatedly.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            render_metrics::POOL_ACQUIRE_TOTAL,
            Unit::Count,
            "Total number of renderer handles checked out of the pool."
        );
        describe_counter!(
            render_metrics::POOL_ACQUIRE_TIMEOUT_TOTAL,
            Unit::Count,
            "Total number of acquire calls that gave up after their timeout."
        );
        describe_counter!(
            render_metrics::POOL_UNHEALTHY_TOTAL,
            Unit::Count,
            "Total number of renderer handles removed after a failed liveness probe."
        );
        describe_counter!(
            render_metrics::POOL_RECYCLED_TOTAL,
            Unit::Count,
            "Total number of renderer handles retired after reaching the use threshold."
        );
        describe_counter!(
            render_metrics::POOL_EVICTED_TOTAL,
            Unit::Count,
            "Total number of idle renderer handles evicted by the sweep."
        );
        describe_gauge!(
            render_metrics::POOL_SIZE,
            Unit::Count,
            "Current number of renderer handles owned by the pool."
        );
        describe_histogram!(
            render_metrics::RENDER_ATTEMPT_MS,
            Unit::Milliseconds,
            "Latency of individual live render attempts in milliseconds."
        );
        describe_counter!(
            render_metrics::GENERATION_TOTAL,
            Unit::Count,
            "Total number of generated documents, labelled by output tier."
        );
    });
}
