//! Local token verification against the key-set cache.
//!
//! Checks run in order: size, header `kid`, key lookup, RS256 signature,
//! `iat` skew, expiry. Each failure maps onto one [`VerifyError`] kind;
//! callers outside this crate usually convert to [`TrustError`], which
//! collapses the kinds into one opaque `AuthenticationFailed`.

use crate::error::{TrustError, EXPIRED_TOKEN_REASON, INVALID_TOKEN_REASON};
use crate::jwt::{extract_kid, validate_iat_at, TokenClaims, DEFAULT_CLOCK_SKEW, SIGNING_ALGORITHM};
use crate::key_set_cache::{KeySetCache, LookupError};
use crate::types::{AuthenticatedSubject, TokenClass};
use jsonwebtoken::{decode, DecodingKey, Validation};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

/// Typed verification failure.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyError {
    /// `kid` not present in the key set.
    #[error("unknown signing key")]
    UnknownKey,

    /// Malformed token, signature mismatch, or implausible `iat`.
    #[error("bad signature")]
    BadSignature,

    /// Current time is strictly after `exp`.
    #[error("token expired")]
    Expired,

    /// Key set could not be loaded at all.
    #[error("key set unavailable")]
    KeySetUnavailable,
}

impl From<LookupError> for VerifyError {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::UnknownKey => VerifyError::UnknownKey,
            LookupError::KeySetUnavailable => VerifyError::KeySetUnavailable,
        }
    }
}

impl From<VerifyError> for TrustError {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::Expired => TrustError::AuthenticationFailed(EXPIRED_TOKEN_REASON.into()),
            VerifyError::UnknownKey | VerifyError::BadSignature => {
                TrustError::AuthenticationFailed(INVALID_TOKEN_REASON.into())
            }
            VerifyError::KeySetUnavailable => TrustError::KeySetUnavailable,
        }
    }
}

/// A token that passed every check.
#[derive(Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub subject: String,
    pub token_class: TokenClass,
    pub issued_at: i64,
    pub expires_at: i64,
}

impl fmt::Debug for VerifiedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifiedToken")
            .field("subject", &"[REDACTED]")
            .field("token_class", &self.token_class)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl From<TokenClaims> for VerifiedToken {
    fn from(claims: TokenClaims) -> Self {
        Self {
            subject: claims.sub,
            token_class: claims.token_class,
            issued_at: claims.iat,
            expires_at: claims.exp,
        }
    }
}

impl From<VerifiedToken> for AuthenticatedSubject {
    fn from(token: VerifiedToken) -> Self {
        Self {
            subject: token.subject,
            token_class: token.token_class,
        }
    }
}

/// Read the `kid` a token claims to be signed with.
///
/// # Errors
///
/// `BadSignature` for oversized or malformed tokens.
pub fn token_kid(token: &str) -> Result<String, VerifyError> {
    extract_kid(token).map_err(|_| VerifyError::BadSignature)
}

/// Check signature, `iat` and expiry of `token` with an already-resolved key.
///
/// Expiry is strict: a token is still valid at `now == exp`.
///
/// # Errors
///
/// `BadSignature` or `Expired`.
pub fn verify_with_key(
    token: &str,
    key: &DecodingKey,
    now: i64,
    clock_skew: Duration,
) -> Result<TokenClaims, VerifyError> {
    let mut validation = Validation::new(SIGNING_ALGORITHM);
    // Expiry is checked below against the caller's clock, without leeway
    validation.validate_exp = false;
    validation.leeway = 0;
    validation.set_required_spec_claims(&["exp", "sub"]);

    let claims = decode::<TokenClaims>(token, key, &validation)
        .map_err(|e| {
            debug!(target: "common.verifier", error = ?e.kind(), "Token signature validation failed");
            VerifyError::BadSignature
        })?
        .claims;

    validate_iat_at(claims.iat, clock_skew, now).map_err(|_| VerifyError::BadSignature)?;

    if now > claims.exp {
        debug!(
            target: "common.verifier",
            exp = claims.exp,
            now = now,
            "Token rejected: expired"
        );
        return Err(VerifyError::Expired);
    }

    Ok(claims)
}

/// Verifies tokens against a [`KeySetCache`].
pub struct TokenVerifier {
    cache: Arc<KeySetCache>,
    clock_skew: Duration,
}

impl TokenVerifier {
    #[must_use]
    pub fn new(cache: Arc<KeySetCache>) -> Self {
        Self {
            cache,
            clock_skew: DEFAULT_CLOCK_SKEW,
        }
    }

    #[must_use]
    pub fn with_clock_skew(mut self, clock_skew: Duration) -> Self {
        self.clock_skew = clock_skew;
        self
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<KeySetCache> {
        &self.cache
    }

    /// Verify `token` against the current time.
    ///
    /// # Errors
    ///
    /// See [`VerifyError`].
    pub async fn verify(&self, token: &str) -> Result<VerifiedToken, VerifyError> {
        self.verify_at(token, chrono::Utc::now().timestamp()).await
    }

    /// Verify `token` as of `now` (Unix seconds).
    ///
    /// # Errors
    ///
    /// See [`VerifyError`].
    #[instrument(skip_all, name = "common.verifier.verify")]
    pub async fn verify_at(&self, token: &str, now: i64) -> Result<VerifiedToken, VerifyError> {
        let kid = token_kid(token)?;
        let key = self.cache.lookup(&kid).await?;
        let claims = verify_with_key(token, &key, now, self.clock_skew)?;
        Ok(claims.into())
    }

    /// Verify and collapse failures into the shared error taxonomy.
    ///
    /// # Errors
    ///
    /// `AuthenticationFailed` with a human-readable reason, or
    /// `KeySetUnavailable`.
    pub async fn authenticate(&self, token: &str) -> Result<VerifiedToken, TrustError> {
        self.verify(token).await.map_err(TrustError::from)
    }
}
