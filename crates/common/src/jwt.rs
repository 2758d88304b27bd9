//! JWT utilities shared across bank-trust services.
//!
//! This module provides the token wire format:
//! - Size limit applied before any parsing
//! - Clock skew constants for `iat` validation
//! - Key ID extraction from JWT headers
//! - The [`TokenClaims`] structure carried by every token
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing
//! - Only RS256 is accepted
//! - Error messages are generic; detail is logged at debug level
//! - The `sub` field in claims is redacted in Debug output

use crate::types::TokenClass;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// A 2048-bit RS256 token with our claims is around 600 bytes. Anything
/// larger than this is rejected before base64 decoding or signature work.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Value of the `typ` header on every token we mint.
pub const TOKEN_TYPE: &str = "JWT";

/// The only signing algorithm issued or accepted.
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::RS256;

/// Default JWT clock skew tolerance (5 minutes).
///
/// Tokens with `iat` more than this far in the future are rejected.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum allowed JWT clock skew tolerance (10 minutes).
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

/// Default token lifetime (10 hours).
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(10 * 60 * 60);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while inspecting a token before verification.
///
/// Error messages are intentionally generic to prevent information leakage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid")]
    TokenTooLarge,

    /// Token format is invalid (not a valid JWT structure).
    #[error("The access token is invalid")]
    MalformedToken,

    /// Token is missing required `kid` header.
    #[error("The access token is invalid")]
    MissingKid,

    /// Token `iat` claim is too far in the future.
    #[error("The access token is invalid")]
    IatTooFarInFuture,
}

// =============================================================================
// Claims Types
// =============================================================================

/// Claims carried by every bank-trust token.
///
/// The `sub` field is redacted in Debug output to prevent accidental logging
/// of user and component identifiers.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: user id or component id.
    pub sub: String,

    /// Which key pair signed this token.
    pub token_class: TokenClass,

    /// Issued-at timestamp (Unix epoch seconds).
    pub iat: i64,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,
}

impl fmt::Debug for TokenClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenClaims")
            .field("sub", &"[REDACTED]")
            .field("token_class", &self.token_class)
            .field("iat", &self.iat)
            .field("exp", &self.exp)
            .finish()
    }
}

impl TokenClaims {
    /// Claims for a token issued at `iat` that lives for `lifetime`.
    #[must_use]
    pub fn new(sub: String, token_class: TokenClass, iat: i64, lifetime: Duration) -> Self {
        #[allow(clippy::cast_possible_wrap)]
        let lifetime_secs = lifetime.as_secs() as i64;
        Self {
            sub,
            token_class,
            iat,
            exp: iat.saturating_add(lifetime_secs),
        }
    }
}

// =============================================================================
// Functions
// =============================================================================

/// Extract the `kid` (key ID) from a JWT header without verifying the signature.
///
/// The kid selects a key from the trusted key set; the token MUST still be
/// verified with that key afterwards.
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` - Wrong structure, bad base64, or invalid header JSON
/// - `MissingKid` - Header has no non-empty string `kid`
pub fn extract_kid(token: &str) -> Result<String, JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    // header.payload.signature
    let mut parts = token.split('.');
    let (Some(header_part), Some(_), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
        return Err(JwtValidationError::MalformedToken);
    };

    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtValidationError::MalformedToken
    })?;

    let header: serde_json::Value = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })?;

    header
        .get("kid")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MissingKid)
}

/// Validate the `iat` claim against an explicit `now` timestamp.
///
/// # Errors
///
/// Returns `IatTooFarInFuture` if `iat` is more than `clock_skew` after `now`.
pub fn validate_iat_at(iat: i64, clock_skew: Duration, now: i64) -> Result<(), JwtValidationError> {
    // clock_skew is bounded by MAX_CLOCK_SKEW in every config path
    #[allow(clippy::cast_possible_wrap)]
    let clock_skew_secs = clock_skew.as_secs() as i64;
    let max_iat = now.saturating_add(clock_skew_secs);

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
