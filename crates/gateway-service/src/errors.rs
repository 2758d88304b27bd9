//! Gateway error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl.
//! Messages returned to clients are generic except for token rejections,
//! whose reason tells the caller whether to refresh.

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
pub enum GatewayError {
    /// Missing, malformed or rejected token.
    #[error("Authentication failed: {0}")]
    Unauthenticated(String),

    /// No key set available to verify against.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<TrustError> for GatewayError {
    fn from(err: TrustError) -> Self {
        match err {
            TrustError::AuthenticationFailed(reason) => GatewayError::Unauthenticated(reason),
            TrustError::InvalidCredentials => {
                GatewayError::Unauthenticated("Invalid credentials".to_string())
            }
            TrustError::KeySetUnavailable | TrustError::ServiceUnreachable(_) => {
                GatewayError::Unavailable(err.to_string())
            }
            TrustError::AlreadyRegistered(_)
            | TrustError::NotFound(_)
            | TrustError::Forbidden(_)
            | TrustError::Configuration(_)
            | TrustError::Internal(_) => GatewayError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (code, message) = match &self {
            GatewayError::Unauthenticated(reason) => ("AUTHENTICATION_FAILED", reason.clone()),
            GatewayError::Unavailable(reason) => {
                tracing::warn!(target: "gateway.availability", reason = %reason, "Service unavailable");
                (
                    "SERVICE_UNAVAILABLE",
                    "Service temporarily unavailable".to_string(),
                )
            }
            GatewayError::Internal(err) => {
                tracing::error!(target: "gateway.errors", error = %err, "Internal failure");
                ("INTERNAL_ERROR", "An internal error occurred".to_string())
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
