use crate::errors::SecurityError;
use crate::routes::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use common::types::{AuthenticatedSubject, RegistrationRequest};
use std::sync::Arc;
use tracing::instrument;

/// Handle component registration
///
/// POST /api/v1/components/register
///
/// Returns 201 on success. The secret in the request proves the caller
/// holds the allow-listed credentials; no token is required.
#[instrument(name = "security.components.register", skip_all)]
pub async fn handle_register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegistrationRequest>,
) -> Result<StatusCode, SecurityError> {
    state.registry.register(payload).await?;
    Ok(StatusCode::CREATED)
}

/// Handle component deregistration
///
/// DELETE /api/v1/components/:id
///
/// Requires the component's own token. Returns 204 on success.
#[instrument(name = "security.components.deregister", skip_all)]
pub async fn handle_deregister(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedSubject>,
    Path(component_id): Path<String>,
) -> Result<StatusCode, SecurityError> {
    state.registry.deregister(&caller, &component_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
