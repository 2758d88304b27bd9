//! Bearer-token middleware for component-only endpoints.
//!
//! Token-authenticate, deregistration and admin routes all require the
//! caller to present its own component token. The verified
//! [`AuthenticatedSubject`] is stored in request extensions.

use crate::errors::SecurityError;
use crate::services::Issuer;
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::IntoResponse,
};
use common::types::TokenClass;
use std::sync::Arc;
use tracing::instrument;

/// Extract the Bearer token from the Authorization header.
pub(crate) fn extract_bearer_token(req: &Request) -> Result<&str, SecurityError> {
    let auth_header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::debug!(target: "security.middleware.auth", "Missing Authorization header");
            SecurityError::AuthenticationFailed("Missing Authorization header".to_string())
        })?;

    auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        tracing::debug!(target: "security.middleware.auth", "Invalid Authorization header format");
        SecurityError::AuthenticationFailed("Invalid Authorization header format".to_string())
    })
}

/// Require a valid component token from a registered component.
///
/// # Response
///
/// - 401 if the token is missing, invalid, expired, or its subject is unknown
/// - 403 if the token is a user token
#[instrument(skip_all, name = "security.middleware.auth")]
pub async fn require_component_token(
    State(issuer): State<Arc<Issuer>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, SecurityError> {
    let token = extract_bearer_token(&req)?.to_string();

    let caller = issuer.authenticate_caller(&token).await?;
    if caller.token_class != TokenClass::Component {
        return Err(SecurityError::Forbidden(
            "A component token is required".to_string(),
        ));
    }

    req.extensions_mut().insert(caller);
    Ok(next.run(req).await)
}
