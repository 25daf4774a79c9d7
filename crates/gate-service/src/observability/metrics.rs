//! Metrics definitions for the gate service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `gate_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `method`: the five gate routes, anything else is `unknown`
//! - `outcome`: gRPC status code names
//! - `feed`: `logging` or `statistics`
//! - `reason`: `closed` or `overflow`

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use tonic::Code;

use crate::grpc::REGISTERED_METHODS;

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
///
/// Must be called from inside a Tokio runtime, before any metrics are
/// recorded.
///
/// # Errors
///
/// Returns an error if bucket configuration is rejected or a recorder is
/// already installed.
pub fn init_metrics_recorder(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full("gate_call_duration_seconds".to_string()),
            &[
                0.0005, 0.001, 0.005, 0.010, 0.050, 0.100, 0.500, 1.000, 10.0, 60.0, 600.0,
            ],
        )
        .map_err(|e| format!("Failed to set call duration buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Full("gate_publish_duration_seconds".to_string()),
            &[0.00001, 0.0001, 0.001, 0.010, 0.100, 1.000],
        )
        .map_err(|e| format!("Failed to set publish duration buckets: {e}"))?
        .install()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// Call Metrics
// ============================================================================

/// Record one finished call, admitted or rejected.
///
/// Metric: `gate_calls_total`, `gate_call_duration_seconds`
/// Labels: `method`, `outcome`
///
/// For server-streaming calls the duration covers the whole stream.
pub fn record_call(method: &str, code: Code, duration: Duration) {
    let method = normalize_method(method);
    let outcome = outcome_label(code);

    histogram!("gate_call_duration_seconds",
        "method" => method,
        "outcome" => outcome
    )
    .record(duration.as_secs_f64());

    counter!("gate_calls_total",
        "method" => method,
        "outcome" => outcome
    )
    .increment(1);
}

fn normalize_method(method: &str) -> &'static str {
    REGISTERED_METHODS
        .iter()
        .copied()
        .find(|known| *known == method)
        .unwrap_or("unknown")
}

fn outcome_label(code: Code) -> &'static str {
    match code {
        Code::Ok => "ok",
        Code::Cancelled => "cancelled",
        Code::Unknown => "unknown",
        Code::InvalidArgument => "invalid_argument",
        Code::DeadlineExceeded => "deadline_exceeded",
        Code::NotFound => "not_found",
        Code::AlreadyExists => "already_exists",
        Code::PermissionDenied => "permission_denied",
        Code::ResourceExhausted => "resource_exhausted",
        Code::FailedPrecondition => "failed_precondition",
        Code::Aborted => "aborted",
        Code::OutOfRange => "out_of_range",
        Code::Unimplemented => "unimplemented",
        Code::Internal => "internal",
        Code::Unavailable => "unavailable",
        Code::DataLoss => "data_loss",
        Code::Unauthenticated => "unauthenticated",
    }
}

// ============================================================================
// Feed Metrics
// ============================================================================

/// Record one call notification fan-out.
///
/// Metric: `gate_events_published_total`, `gate_events_delivered_total`,
/// `gate_publish_duration_seconds`
pub fn record_event_published(delivered: usize, duration: Duration) {
    counter!("gate_events_published_total").increment(1);
    counter!("gate_events_delivered_total").increment(delivered as u64);
    histogram!("gate_publish_duration_seconds").record(duration.as_secs_f64());
}

/// Set the number of live subscribers on a feed.
///
/// Metric: `gate_feed_subscribers`
/// Labels: `feed`
#[allow(clippy::cast_precision_loss)]
pub fn set_feed_subscribers(feed: &'static str, count: usize) {
    gauge!("gate_feed_subscribers", "feed" => feed).set(count as f64);
}

/// Record a subscriber removed by the gate rather than by its own stream.
///
/// Metric: `gate_subscribers_dropped_total`
/// Labels: `feed`, `reason`
pub fn record_subscriber_dropped(feed: &'static str, reason: &'static str) {
    counter!("gate_subscribers_dropped_total",
        "feed" => feed,
        "reason" => reason
    )
    .increment(1);
}
