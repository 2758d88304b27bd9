use crate::errors::SecurityError;
use crate::routes::AppState;
use crate::services::key_management_service;
use axum::{extract::State, Extension, Json};
use common::types::{AuthenticatedSubject, TokenClass};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

#[derive(Debug, Deserialize)]
pub struct RotateKeyRequest {
    pub token_class: TokenClass,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RotateKeyResponse {
    pub kid: String,
}

/// Handle signing key rotation
///
/// POST /api/v1/admin/keys/rotate
///
/// Requires a component token whose subject is listed in
/// `ADMIN_COMPONENT_IDS`.
#[instrument(name = "security.admin.rotate", skip_all)]
pub async fn handle_rotate_key(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedSubject>,
    Json(payload): Json<RotateKeyRequest>,
) -> Result<Json<RotateKeyResponse>, SecurityError> {
    if !state
        .config
        .admin_component_ids
        .iter()
        .any(|id| id == &caller.subject)
    {
        return Err(SecurityError::Forbidden(
            "Component is not allowed to rotate keys".to_string(),
        ));
    }

    let kid =
        key_management_service::rotate_signing_key(state.issuer.keys().clone(), payload.token_class)
            .await?;

    info!(
        target: "security.admin",
        component_id = %caller.subject,
        token_class = %payload.token_class,
        kid = %kid,
        "Signing key rotated on request"
    );
    Ok(Json(RotateKeyResponse { kid }))
}
