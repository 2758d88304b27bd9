//! HTTP routes for the Security-Component.
//!
//! Defines the Axum router and application state.

use crate::config::Config;
use crate::handlers::{
    self, admin_handler, auth_handler, jwks_handler, registration_handler,
};
use crate::middleware::require_component_token;
use crate::services::{Issuer, Registry};
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use common::issuer_client::{
    AUTHENTICATE_PATH, KEY_SET_PATH, REGISTER_PATH, TOKEN_AUTHENTICATE_PATH,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub issuer: Arc<Issuer>,
    pub registry: Arc<Registry>,
    pub config: Config,
}

/// Build the application routes.
///
/// - `/health`, `/metrics`, `/.well-known/jwks.json` - public
/// - `/api/v1/auth/token` - public, credentials in the body
/// - `/api/v1/components/register` - public, allow-listed secret in the body
/// - `/api/v1/auth/token/authenticate` - component token
/// - `/api/v1/components/:id` (DELETE) - the component's own token
/// - `/api/v1/admin/keys/rotate` - component token on the admin list
/// - TraceLayer for request logging
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route(KEY_SET_PATH, get(jwks_handler::handle_get_jwks))
        .route(AUTHENTICATE_PATH, post(auth_handler::handle_authenticate))
        .route(REGISTER_PATH, post(registration_handler::handle_register))
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    let protected_routes = Router::new()
        .route(
            TOKEN_AUTHENTICATE_PATH,
            post(auth_handler::handle_token_authenticate),
        )
        .route(
            "/api/v1/components/:id",
            delete(registration_handler::handle_deregister),
        )
        .route(
            "/api/v1/admin/keys/rotate",
            post(admin_handler::handle_rotate_key),
        )
        .route_layer(middleware::from_fn_with_state(
            state.issuer.clone(),
            require_component_token,
        ))
        .with_state(state);

    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
}
