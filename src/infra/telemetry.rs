use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::metrics as cache_metrics;
use crate::config::{LogFormat, LoggingSettings};
use crate::realtime::metrics as socket_metrics;

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

/// Register descriptions for every metric the crate emits. Safe to call repeatedly.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            cache_metrics::HIT_TOTAL,
            Unit::Count,
            "Total number of query cache reads served from fresh data."
        );
        describe_counter!(
            cache_metrics::STALE_HIT_TOTAL,
            Unit::Count,
            "Total number of query cache reads served from stale data while revalidating."
        );
        describe_counter!(
            cache_metrics::MISS_TOTAL,
            Unit::Count,
            "Total number of query cache reads that had to wait for a fetch."
        );
        describe_counter!(
            cache_metrics::FETCH_TOTAL,
            Unit::Count,
            "Total number of fetches started by the query cache."
        );
        describe_counter!(
            cache_metrics::FETCH_DEDUPED_TOTAL,
            Unit::Count,
            "Total number of fetch requests joined onto an in-flight fetch."
        );
        describe_counter!(
            cache_metrics::FETCH_ERROR_TOTAL,
            Unit::Count,
            "Total number of fetches that failed after retries."
        );
        describe_counter!(
            cache_metrics::INVALIDATION_TOTAL,
            Unit::Count,
            "Total number of cache entries marked stale by invalidation."
        );
        describe_histogram!(
            cache_metrics::FETCH_MS,
            Unit::Milliseconds,
            "Query fetch latency in milliseconds, retries included."
        );
        describe_gauge!(
            cache_metrics::ENTRIES,
            Unit::Count,
            "Current number of entries held by the query cache."
        );
        describe_counter!(
            socket_metrics::EVENT_TOTAL,
            Unit::Count,
            "Total number of push events delivered to listeners."
        );
        describe_counter!(
            socket_metrics::FRAME_DROPPED_TOTAL,
            Unit::Count,
            "Total number of push frames dropped because they could not be parsed."
        );
        describe_counter!(
            socket_metrics::RECONNECT_TOTAL,
            Unit::Count,
            "Total number of socket reconnect attempts."
        );
    });
}
