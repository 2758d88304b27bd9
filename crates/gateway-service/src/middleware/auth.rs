//! Request authentication middleware.
//!
//! Every request whose path starts with the protected prefix must carry a
//! bearer token. [`authenticate_request`] verifies it, stores the
//! [`AuthenticatedSubject`] in request extensions and continues; any
//! failure ends the chain with a 401 (503 when local verification has no
//! key set at all). Other paths pass through untouched.

use crate::config::VerificationMode;
use crate::errors::GatewayError;
use crate::observability::metrics::record_auth_request;
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use common::error::TrustError;
use common::issuer_client::IssuerClient;
use common::token_manager::{OutboundTokenManager, TokenError};
use common::types::{AuthenticatedSubject, TokenVerdict};
use common::verifier::{TokenVerifier, VerifyError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// Reason returned when the Security-Component could not give an answer.
pub const VERIFICATION_UNAVAILABLE_REASON: &str = "Token verification unavailable";

/// How a token is turned into an identity.
pub enum Verification {
    /// Signature check against the cached key set.
    Local(Arc<TokenVerifier>),

    /// Token-authenticate call into the Security-Component, authorized by
    /// this gateway's own component token.
    Remote {
        issuer: Arc<dyn IssuerClient>,
        tokens: OutboundTokenManager,
        timeout: Duration,
    },
}

impl Verification {
    #[must_use]
    pub fn mode(&self) -> VerificationMode {
        match self {
            Verification::Local(_) => VerificationMode::Local,
            Verification::Remote { .. } => VerificationMode::Remote,
        }
    }

    /// Resolve `token`, presented on a request to `path`, to its subject.
    ///
    /// # Errors
    ///
    /// - `Unauthenticated` with the rejection reason for a bad token, and
    ///   for every remote failure or timeout
    /// - `Unavailable` when local verification has no key set
    pub async fn authenticate(
        &self,
        token: &str,
        path: &str,
    ) -> Result<AuthenticatedSubject, GatewayError> {
        match self {
            Verification::Local(verifier) => match verifier.verify(token).await {
                Ok(verified) => Ok(verified.into()),
                Err(VerifyError::KeySetUnavailable) => Err(GatewayError::Unavailable(
                    VerifyError::KeySetUnavailable.to_string(),
                )),
                Err(e) => {
                    debug!(target: "gateway.middleware.auth", error = %e, "Local verification rejected token");
                    Err(TrustError::from(e).into())
                }
            },
            Verification::Remote {
                issuer,
                tokens,
                timeout,
            } => {
                let call = tokens.call(move |bearer| async move {
                    issuer.authenticate_token(&bearer, token, path).await
                });

                match tokio::time::timeout(*timeout, call).await {
                    Err(_) => {
                        warn!(
                            target: "gateway.middleware.auth",
                            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                            "Remote verification timed out"
                        );
                        Err(GatewayError::Unauthenticated(
                            VERIFICATION_UNAVAILABLE_REASON.to_string(),
                        ))
                    }
                    Ok(Err(e)) => {
                        match &e {
                            TokenError::IdentityLost(_) => warn!(
                                target: "gateway.middleware.auth",
                                error = %e,
                                "Gateway identity lost during remote verification"
                            ),
                            TokenError::Call(_) => warn!(
                                target: "gateway.middleware.auth",
                                error = %e,
                                "Remote verification failed"
                            ),
                        }
                        Err(GatewayError::Unauthenticated(
                            VERIFICATION_UNAVAILABLE_REASON.to_string(),
                        ))
                    }
                    Ok(Ok(TokenVerdict::Authenticated(subject))) => Ok(subject),
                    Ok(Ok(TokenVerdict::Rejected { reason })) => {
                        debug!(target: "gateway.middleware.auth", reason = %reason, "Issuer rejected token");
                        Err(GatewayError::Unauthenticated(reason))
                    }
                }
            }
        }
    }
}

/// State for the authentication middleware.
pub struct AuthState {
    pub protected_prefix: String,
    pub verification: Verification,
}

impl AuthState {
    #[must_use]
    pub fn is_protected(&self, path: &str) -> bool {
        path.starts_with(&self.protected_prefix)
    }
}

/// Extract the Bearer token from the Authorization header.
fn extract_bearer_token(req: &Request) -> Result<&str, GatewayError> {
    let auth_header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            debug!(target: "gateway.middleware.auth", "Missing Authorization header");
            GatewayError::Unauthenticated("Missing Authorization header".to_string())
        })?;

    match auth_header.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim()),
        _ => {
            debug!(target: "gateway.middleware.auth", "Invalid Authorization header format");
            Err(GatewayError::Unauthenticated(
                "Invalid Authorization header format".to_string(),
            ))
        }
    }
}

/// Authenticate requests under the protected prefix.
///
/// # Response
///
/// - passes through unchanged for paths outside the prefix
/// - 401 with `WWW-Authenticate` if the token is missing or rejected
/// - 503 if local verification cannot load a key set
/// - otherwise continues with the `AuthenticatedSubject` in extensions
#[instrument(skip_all, name = "gateway.middleware.auth")]
pub async fn authenticate_request(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let path = req.uri().path().to_string();
    if !state.is_protected(&path) {
        return Ok(next.run(req).await);
    }

    let start = Instant::now();
    let result = match extract_bearer_token(&req).map(ToString::to_string) {
        Ok(token) => state.verification.authenticate(&token, &path).await,
        Err(e) => Err(e),
    };

    let status = match &result {
        Ok(_) => "authenticated",
        Err(GatewayError::Unauthenticated(_)) => "rejected",
        Err(_) => "unavailable",
    };
    record_auth_request(state.verification.mode().as_str(), status, start.elapsed());

    req.extensions_mut().insert(result?);
    Ok(next.run(req).await)
}
