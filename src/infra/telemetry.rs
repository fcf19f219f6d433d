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

enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

const METRICS: &[(&str, MetricKind, &str)] = &[
    (
        "trellis_output_cache_hit_total",
        MetricKind::Counter,
        "Total number of output cache hits.",
    ),
    (
        "trellis_output_cache_miss_total",
        MetricKind::Counter,
        "Total number of output cache misses.",
    ),
    (
        "trellis_output_cache_eject_total",
        MetricKind::Counter,
        "Total number of output cache entries ejected by key.",
    ),
    (
        "trellis_asset_invalidations_total",
        MetricKind::Counter,
        "Total number of resources invalidated by asset changes.",
    ),
    (
        "trellis_http_not_modified_total",
        MetricKind::Counter,
        "Total number of conditional requests answered with 304.",
    ),
    (
        "trellis_change_queue_len",
        MetricKind::Gauge,
        "Current number of asset change events waiting to be applied.",
    ),
    (
        "trellis_cache_invalidation_ms",
        MetricKind::Histogram,
        "Invalidation batch latency in milliseconds.",
    ),
];

/// Install the global tracing subscriber and describe the crate's metrics.
///
/// `RUST_LOG` directives take precedence over the configured level.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let output = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_thread_ids(false)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(ErrorLayer::default())
        .with(output)
        .try_init()
        .map_err(|err| InfraError::telemetry(format!("subscriber already installed: {err}")))
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        for (name, kind, description) in METRICS {
            let name = *name;
            let description = *description;
            match kind {
                MetricKind::Counter => describe_counter!(name, Unit::Count, description),
                MetricKind::Gauge => describe_gauge!(name, Unit::Count, description),
                MetricKind::Histogram => {
                    describe_histogram!(name, Unit::Milliseconds, description)
                }
            }
        }
    });
}
