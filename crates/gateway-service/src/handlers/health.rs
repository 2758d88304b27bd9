//! Liveness probe.

/// Returns "OK" while the process is serving.
pub async fn health_check() -> &'static str {
    "OK"
}
