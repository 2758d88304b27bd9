//! Outbound component token management.
//!
//! [`OutboundTokenManager`] owns this component's current token and wraps
//! every outgoing inter-component call:
//!
//! - the call receives the current token to attach as `Authorization: Bearer`
//! - an upstream `AuthenticationFailed` that says the token expired triggers
//!   exactly one re-authentication through the issuer, then one retry
//! - a second expiry, or a failed re-authentication, means the component has
//!   lost its identity: the identity-loss handler runs and the call returns
//!   [`TokenError::IdentityLost`]
//!
//! The token lives in a `tokio::sync::watch` cell. Readers clone the whole
//! value; the refresh path is the only writer and replaces it wholesale.
//!
//! # Example
//!
//! ```rust,ignore
//! let tokens = OutboundTokenManager::start(issuer, identity, exit_on_identity_loss()).await?;
//!
//! let response = tokens
//!     .send(|| http.get("http://accounts:8080/api/v1/accounts"))
//!     .await?;
//! ```

use crate::error::{ErrorResponse, TrustError};
use crate::issuer_client::IssuerClient;
use crate::secret::{ExposeSecret, SecretString};
use crate::types::{ComponentIdentity, TokenClass};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, instrument, warn};

// =============================================================================
// Error Types
// =============================================================================

/// Errors returned by calls wrapped in the token manager.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// The wrapped call failed for a reason other than token expiry.
    #[error(transparent)]
    Call(#[from] TrustError),

    /// Re-authentication failed, or the refreshed token was also rejected.
    #[error("Component identity lost: {0}")]
    IdentityLost(String),
}

impl From<TokenError> for TrustError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Call(e) => e,
            TokenError::IdentityLost(reason) => {
                TrustError::Internal(format!("component identity lost: {reason}"))
            }
        }
    }
}

// =============================================================================
// Identity Loss Handling
// =============================================================================

/// Called once the component can no longer obtain a valid token.
pub type IdentityLossHandler = Arc<dyn Fn(&TrustError) + Send + Sync>;

/// Production handler: log and terminate the process.
///
/// A component that cannot authenticate must not keep serving. The exit
/// skips deregistration, so the id stays registered; the restarted
/// process reclaims it during bootstrap.
#[must_use]
pub fn exit_on_identity_loss() -> IdentityLossHandler {
    Arc::new(|err| {
        error!(
            target: "common.token_manager",
            error = %err,
            "Unable to refresh component token, terminating"
        );
        std::process::exit(1);
    })
}

/// Handler that only logs. The caller sees `IdentityLost` and decides.
#[must_use]
pub fn log_identity_loss() -> IdentityLossHandler {
    Arc::new(|err| {
        error!(
            target: "common.token_manager",
            error = %err,
            "Unable to refresh component token"
        );
    })
}

// =============================================================================
// Token Receiver
// =============================================================================

/// Read-only view of the current token.
///
/// Clones the token out of the cell so the borrow is never held across
/// an await.
#[derive(Clone)]
pub struct TokenReceiver(watch::Receiver<SecretString>);

impl TokenReceiver {
    #[must_use]
    pub fn token(&self) -> SecretString {
        self.0.borrow().clone()
    }

    /// Wait for the token to change.
    ///
    /// # Errors
    ///
    /// Returns `TrustError::Internal` if the manager has been dropped.
    pub async fn changed(&mut self) -> Result<(), TrustError> {
        self.0
            .changed()
            .await
            .map_err(|_| TrustError::Internal("token channel closed".into()))
    }
}

impl std::fmt::Debug for TokenReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenReceiver")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

// =============================================================================
// Outbound Token Manager
// =============================================================================

struct Inner {
    issuer: Arc<dyn IssuerClient>,
    principal: String,
    secret: SecretString,
    sender: watch::Sender<SecretString>,
    /// Serializes re-authentication.
    refresh_lock: Mutex<()>,
    on_identity_loss: IdentityLossHandler,
    reauthentications: AtomicU64,
}

/// Holds this component's token and refreshes it when upstream says it expired.
#[derive(Clone)]
pub struct OutboundTokenManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for OutboundTokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundTokenManager")
            .field("principal", &self.inner.principal)
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl OutboundTokenManager {
    /// Authenticate `identity` and build a manager around the first token.
    ///
    /// # Errors
    ///
    /// Propagates the issuer's error; nothing is retried.
    #[instrument(skip_all, fields(component_id = %identity.id))]
    pub async fn start(
        issuer: Arc<dyn IssuerClient>,
        identity: &ComponentIdentity,
        on_identity_loss: IdentityLossHandler,
    ) -> Result<Self, TrustError> {
        let issued = issuer
            .authenticate(&identity.id, &identity.secret, TokenClass::Component)
            .await?;

        info!(
            target: "common.token_manager",
            component_id = %identity.id,
            expires_in_secs = issued.expires_in,
            "Initial component token acquired"
        );

        Ok(Self::with_token(issuer, identity, issued.token, on_identity_loss))
    }

    /// Build a manager around an already-acquired token.
    #[must_use]
    pub fn with_token(
        issuer: Arc<dyn IssuerClient>,
        identity: &ComponentIdentity,
        token: SecretString,
        on_identity_loss: IdentityLossHandler,
    ) -> Self {
        let (sender, _receiver) = watch::channel(token);
        Self {
            inner: Arc::new(Inner {
                issuer,
                principal: identity.id.clone(),
                secret: identity.secret.clone(),
                sender,
                refresh_lock: Mutex::new(()),
                on_identity_loss,
                reauthentications: AtomicU64::new(0),
            }),
        }
    }

    #[must_use]
    pub fn current_token(&self) -> SecretString {
        self.inner.sender.borrow().clone()
    }

    #[must_use]
    pub fn receiver(&self) -> TokenReceiver {
        TokenReceiver(self.inner.sender.subscribe())
    }

    /// How many times the token has been re-acquired after an expiry.
    #[must_use]
    pub fn reauthentication_count(&self) -> u64 {
        self.inner.reauthentications.load(Ordering::Relaxed)
    }

    /// Run `call` with the current token, refreshing and retrying once on expiry.
    ///
    /// # Errors
    ///
    /// - `Call` with the call's own error when it is not an expiry
    /// - `IdentityLost` if re-authentication fails or the retry also expires
    pub async fn call<T, F, Fut>(&self, mut call: F) -> Result<T, TokenError>
    where
        F: FnMut(SecretString) -> Fut,
        Fut: Future<Output = Result<T, TrustError>>,
    {
        let mut refreshed = false;

        loop {
            let token = self.current_token();
            match call(token.clone()).await {
                Err(err) if err.is_expiry() => {
                    if refreshed {
                        return Err(self.lose_identity(&err));
                    }
                    debug!(target: "common.token_manager", "Upstream reported expired token, refreshing");
                    self.refresh_after_expiry(&token).await?;
                    refreshed = true;
                }
                result => return result.map_err(TokenError::Call),
            }
        }
    }

    /// Send a `reqwest` request built by `build` with the bearer token attached.
    ///
    /// A `401` whose error body reports expiry goes through the refresh path;
    /// any other `401` is returned as `AuthenticationFailed`. Every other
    /// response is returned as-is.
    ///
    /// # Errors
    ///
    /// As [`OutboundTokenManager::call`]; transport failures are
    /// `ServiceUnreachable`.
    pub async fn send<B>(&self, build: B) -> Result<reqwest::Response, TokenError>
    where
        B: Fn() -> reqwest::RequestBuilder,
    {
        self.call(|token| {
            let request = build().bearer_auth(token.expose_secret());
            async move {
                let response = request
                    .send()
                    .await
                    .map_err(|e| TrustError::ServiceUnreachable(e.to_string()))?;

                if response.status() == reqwest::StatusCode::UNAUTHORIZED {
                    let body = response.text().await.unwrap_or_default();
                    let reason = serde_json::from_str::<ErrorResponse>(&body)
                        .map(|r| r.error.message)
                        .unwrap_or(body);
                    return Err(TrustError::AuthenticationFailed(reason));
                }
                Ok(response)
            }
        })
        .await
    }

    /// Replace the token that just failed, unless another caller already did.
    async fn refresh_after_expiry(&self, failed: &SecretString) -> Result<(), TokenError> {
        let _guard = self.inner.refresh_lock.lock().await;

        if self.current_token().expose_secret() != failed.expose_secret() {
            debug!(target: "common.token_manager", "Token already refreshed by a concurrent call");
            return Ok(());
        }

        match self
            .inner
            .issuer
            .authenticate(&self.inner.principal, &self.inner.secret, TokenClass::Component)
            .await
        {
            Ok(issued) => {
                self.inner.sender.send_replace(issued.token);
                self.inner.reauthentications.fetch_add(1, Ordering::Relaxed);
                info!(
                    target: "common.token_manager",
                    component_id = %self.inner.principal,
                    expires_in_secs = issued.expires_in,
                    "Component token refreshed"
                );
                Ok(())
            }
            Err(err) => {
                warn!(target: "common.token_manager", error = %err, "Component re-authentication failed");
                Err(self.lose_identity(&err))
            }
        }
    }

    fn lose_identity(&self, err: &TrustError) -> TokenError {
        (self.inner.on_identity_loss)(err);
        TokenError::IdentityLost(err.to_string())
    }
}

// =============================================================================
// Tests
// =============================================================================
