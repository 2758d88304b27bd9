//! Metrics definitions for the gateway.
//!
//! Labels are bounded:
//! - `mode`: local, remote
//! - `status`: authenticated, rejected, unavailable

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and return the handle served on `/metrics`.
///
/// # Errors
///
/// Returns an error if a recorder is already installed in this process.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Local verification is sub-millisecond; remote calls are bounded by the verify timeout
        .set_buckets_for_metric(
            Matcher::Full("gateway_auth_duration_seconds".to_string()),
            &[0.0005, 0.001, 0.005, 0.010, 0.050, 0.100, 0.500, 1.000, 6.000],
        )
        .map_err(|e| format!("Failed to set auth duration buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

/// Record one authentication decision on a protected path
///
/// Metric: `gateway_auth_requests_total`, `gateway_auth_duration_seconds`
/// Labels: `mode`, `status`
pub fn record_auth_request(mode: &str, status: &str, duration: Duration) {
    histogram!("gateway_auth_duration_seconds",
        "mode" => mode.to_string(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("gateway_auth_requests_total",
        "mode" => mode.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}
