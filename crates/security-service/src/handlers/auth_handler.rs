use crate::errors::SecurityError;
use crate::routes::AppState;
use axum::{extract::State, Extension, Json};
use common::types::{
    AuthenticateRequest, AuthenticatedSubject, TokenAuthenticateRequest, TokenResponse,
    TokenVerdict,
};
use std::sync::Arc;
use tracing::instrument;

/// Handle token request
///
/// POST /api/v1/auth/token
///
/// Exchanges a principal and secret for a token of the requested class.
/// Any credential failure is an opaque 401 `INVALID_CREDENTIALS`.
#[instrument(name = "security.auth.token", skip_all)]
pub async fn handle_authenticate(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AuthenticateRequest>,
) -> Result<Json<TokenResponse>, SecurityError> {
    let minted = state
        .issuer
        .authenticate(&payload.principal, &payload.credentials, payload.token_class)
        .await?;

    Ok(Json(TokenResponse {
        access_token: minted.token,
        token_type: "Bearer".to_string(),
        expires_in: minted.expires_in,
    }))
}

/// Handle remote token authentication
///
/// POST /api/v1/auth/token/authenticate
///
/// Requires the caller's component token (enforced by middleware). A
/// rejected inspected token is a 200 with `"result": "rejected"`; a 401
/// from this endpoint always concerns the caller's own token.
#[instrument(name = "security.auth.token_authenticate", skip_all)]
pub async fn handle_token_authenticate(
    State(state): State<Arc<AppState>>,
    Extension(_caller): Extension<AuthenticatedSubject>,
    Json(payload): Json<TokenAuthenticateRequest>,
) -> Result<Json<TokenVerdict>, SecurityError> {
    let verdict = match state
        .issuer
        .authenticate_token(&payload.token, &payload.request_path)
        .await
    {
        Ok(subject) => TokenVerdict::Authenticated(subject),
        Err(SecurityError::AuthenticationFailed(reason)) => TokenVerdict::Rejected { reason },
        Err(e) => return Err(e),
    };
    Ok(Json(verdict))
}
