//! HTTP routes for the gateway.

use crate::handlers;
use crate::middleware::{authenticate_request, AuthState};
use axum::{middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Build the application routes.
///
/// - `/health`, `/metrics` - public
/// - `/api/v1/whoami` - identity established by the auth middleware
/// - authentication middleware on every route, including the fallback, so
///   unknown paths under the protected prefix still need a token
/// - TraceLayer for request logging
/// - 30 second request timeout
pub fn build_routes(auth: Arc<AuthState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/v1/whoami", get(handlers::whoami))
        .merge(metrics_routes)
        .layer(middleware::from_fn_with_state(auth, authenticate_request))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
}
