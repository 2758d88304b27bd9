//! Security-Component error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl.
//! Messages returned to clients are generic; internal detail is logged
//! server-side.

use axum::{
    http::{header::WWW_AUTHENTICATE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use common::error::{ErrorDetail, ErrorResponse, TrustError};
use thiserror::Error;

/// `WWW-Authenticate` value sent with every 401.
pub const BEARER_CHALLENGE: &str = "Bearer realm=\"bank-trust\"";

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Seed data error: {0}")]
    Seed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SecurityError {
    /// HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> StatusCode {
        match self {
            SecurityError::InvalidCredentials | SecurityError::AuthenticationFailed(_) => {
                StatusCode::UNAUTHORIZED
            }
            SecurityError::AlreadyRegistered(_) => StatusCode::CONFLICT,
            SecurityError::NotFound(_) => StatusCode::NOT_FOUND,
            SecurityError::Forbidden(_) => StatusCode::FORBIDDEN,
            SecurityError::BadRequest(_) => StatusCode::BAD_REQUEST,
            SecurityError::Crypto(_) | SecurityError::Seed(_) | SecurityError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<TrustError> for SecurityError {
    fn from(err: TrustError) -> Self {
        match err {
            TrustError::InvalidCredentials => SecurityError::InvalidCredentials,
            TrustError::AuthenticationFailed(reason) => SecurityError::AuthenticationFailed(reason),
            TrustError::AlreadyRegistered(id) => SecurityError::AlreadyRegistered(id),
            TrustError::NotFound(what) => SecurityError::NotFound(what),
            TrustError::Forbidden(reason) => SecurityError::Forbidden(reason),
            TrustError::KeySetUnavailable
            | TrustError::ServiceUnreachable(_)
            | TrustError::Configuration(_)
            | TrustError::Internal(_) => SecurityError::Internal(err.to_string()),
        }
    }
}

/// Used by in-process clients that call the services directly.
impl From<SecurityError> for TrustError {
    fn from(err: SecurityError) -> Self {
        match err {
            SecurityError::InvalidCredentials => TrustError::InvalidCredentials,
            SecurityError::AuthenticationFailed(reason) => TrustError::AuthenticationFailed(reason),
            SecurityError::AlreadyRegistered(id) => TrustError::AlreadyRegistered(id),
            SecurityError::NotFound(what) => TrustError::NotFound(what),
            SecurityError::Forbidden(reason) => TrustError::Forbidden(reason),
            SecurityError::BadRequest(reason) => TrustError::Internal(reason),
            SecurityError::Crypto(_) | SecurityError::Seed(_) | SecurityError::Internal(_) => {
                TrustError::Internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for SecurityError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (code, message) = match &self {
            SecurityError::InvalidCredentials => {
                ("INVALID_CREDENTIALS", "Invalid credentials".to_string())
            }
            SecurityError::AuthenticationFailed(reason) => {
                ("AUTHENTICATION_FAILED", reason.clone())
            }
            SecurityError::AlreadyRegistered(id) => (
                "ALREADY_REGISTERED",
                format!("Component '{id}' is already registered"),
            ),
            SecurityError::NotFound(what) => ("NOT_FOUND", format!("Not found: {what}")),
            SecurityError::Forbidden(reason) => ("FORBIDDEN", reason.clone()),
            SecurityError::BadRequest(reason) => ("BAD_REQUEST", reason.clone()),
            SecurityError::Crypto(err) | SecurityError::Seed(err) | SecurityError::Internal(err) => {
                tracing::error!(target: "security.errors", error = %err, "Internal failure");
                (
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static(BEARER_CHALLENGE));
        }
        response
    }
}
