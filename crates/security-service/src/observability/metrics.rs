//! Metrics definitions for the Security-Component.
//!
//! All metrics follow Prometheus naming conventions:
//! - `security_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `token_class`: 2 values (user, component)
//! - `status`: success, error, rejected
//! - `operation`: register, deregister

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
        // Issuance includes one bcrypt verification, so buckets reach past a second
        .set_buckets_for_metric(
            Matcher::Full("security_token_issuance_duration_seconds".to_string()),
            &[0.010, 0.050, 0.100, 0.200, 0.300, 0.500, 1.000, 2.000],
        )
        .map_err(|e| format!("Failed to set token issuance buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// Token Metrics
// ============================================================================

/// Record token issuance duration and outcome
///
/// Metric: `security_token_issuance_total`, `security_token_issuance_duration_seconds`
/// Labels: `token_class`, `status`
pub fn record_token_issuance(token_class: &str, status: &str, duration: Duration) {
    histogram!("security_token_issuance_duration_seconds",
        "token_class" => token_class.to_string(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("security_token_issuance_total",
        "token_class" => token_class.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a remote token authentication outcome
///
/// Metric: `security_token_authentications_total`
/// Labels: `status` (authenticated, rejected)
pub fn record_token_authentication(status: &str) {
    counter!("security_token_authentications_total", "status" => status.to_string()).increment(1);
}

// ============================================================================
// Key Metrics
// ============================================================================

/// Metric: `security_key_set_requests_total`
pub fn record_key_set_request() {
    counter!("security_key_set_requests_total").increment(1);
}

/// Record key rotation event
///
/// Metric: `security_key_rotation_total`
/// Labels: `token_class`, `status`
pub fn record_key_rotation(token_class: &str, status: &str) {
    counter!("security_key_rotation_total",
        "token_class" => token_class.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

// ============================================================================
// Registry Metrics
// ============================================================================

/// Record a registry operation
///
/// Metric: `security_registrations_total`
/// Labels: `operation` (register, deregister), `status`
pub fn record_registration(operation: &str, status: &str) {
    counter!("security_registrations_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}
