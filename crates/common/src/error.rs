//! Common error types for bank-trust components.
//!
//! Every failure in the trust layer collapses into [`TrustError`]. The
//! services wrap it in their own `IntoResponse` types; the HTTP issuer
//! client reconstructs it from the [`ErrorResponse`] body on the wire.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reason carried by `AuthenticationFailed` when a token is past `exp`.
///
/// Callers that see this reason refresh their own token; keep the wording
/// stable since it crosses process boundaries.
pub const EXPIRED_TOKEN_REASON: &str = "The access token has expired";

/// Reason carried by `AuthenticationFailed` for every other token failure.
pub const INVALID_TOKEN_REASON: &str = "The access token is invalid";

/// Common errors that can occur across bank-trust components.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrustError {
    /// Principal unknown or secret mismatch. Deliberately indistinguishable.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Token failed verification, or its subject is no longer known.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Key set could not be fetched while the cache was empty.
    #[error("Key set unavailable")]
    KeySetUnavailable,

    /// Remote service could not be reached (transport failure or open circuit).
    #[error("Service unreachable: {0}")]
    ServiceUnreachable(String),

    /// Component id is already present in the registry.
    #[error("Already registered: {0}")]
    AlreadyRegistered(String),

    /// Internal lookup found nothing.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Authenticated, but not allowed to perform the operation.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TrustError {
    /// HTTP status code this error maps to.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            TrustError::InvalidCredentials | TrustError::AuthenticationFailed(_) => 401,
            TrustError::Forbidden(_) => 403,
            TrustError::NotFound(_) => 404,
            TrustError::AlreadyRegistered(_) => 409,
            TrustError::KeySetUnavailable | TrustError::ServiceUnreachable(_) => 503,
            TrustError::Configuration(_) | TrustError::Internal(_) => 500,
        }
    }

    /// Stable machine-readable code used in error bodies.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            TrustError::InvalidCredentials => "INVALID_CREDENTIALS",
            TrustError::AuthenticationFailed(_) => "AUTHENTICATION_FAILED",
            TrustError::KeySetUnavailable => "KEY_SET_UNAVAILABLE",
            TrustError::ServiceUnreachable(_) => "SERVICE_UNREACHABLE",
            TrustError::AlreadyRegistered(_) => "ALREADY_REGISTERED",
            TrustError::NotFound(_) => "NOT_FOUND",
            TrustError::Forbidden(_) => "FORBIDDEN",
            TrustError::Configuration(_) | TrustError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether this is an `AuthenticationFailed` caused by token expiry.
    #[must_use]
    pub fn is_expiry(&self) -> bool {
        match self {
            TrustError::AuthenticationFailed(reason) => {
                reason.to_ascii_lowercase().contains("expired")
            }
            _ => false,
        }
    }

    /// Whether this error says something about the health of the remote
    /// side (as opposed to a well-formed rejection).
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            TrustError::ServiceUnreachable(_) | TrustError::KeySetUnavailable
        )
    }

    /// Message safe to return to a client.
    ///
    /// Internal detail is only ever logged server-side.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            TrustError::InvalidCredentials => "Invalid credentials".to_string(),
            TrustError::AuthenticationFailed(reason) => reason.clone(),
            TrustError::KeySetUnavailable => "Signing keys are temporarily unavailable".to_string(),
            TrustError::ServiceUnreachable(_) => "Service temporarily unavailable".to_string(),
            TrustError::AlreadyRegistered(id) => format!("Component already registered: {id}"),
            TrustError::NotFound(what) => format!("Not found: {what}"),
            TrustError::Forbidden(reason) => reason.clone(),
            TrustError::Configuration(_) | TrustError::Internal(_) => {
                "An internal error occurred".to_string()
            }
        }
    }

    /// Build the JSON error body for this error.
    #[must_use]
    pub fn to_response_body(&self) -> ErrorResponse {
        ErrorResponse {
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.public_message(),
            },
        }
    }
}

/// Error body shared by every bank-trust HTTP endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

/// Inner part of [`ErrorResponse`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// Result type alias using `TrustError`
pub type Result<T> = std::result::Result<T, TrustError>;
