//! Startup registration and shutdown deregistration.
//!
//! Every component runs [`bootstrap`] before serving traffic:
//!
//! 1. register its identity with the Security-Component registry
//! 2. authenticate to obtain its first component token
//! 3. warm the key-set cache, when it verifies tokens locally
//!
//! A component that exits without deregistering (identity loss, crash,
//! SIGKILL) leaves its id registered. On restart, registration answers
//! `AlreadyRegistered`; bootstrap then proves ownership by authenticating
//! with the component's own secret, removes the stale entry and registers
//! again. Any other failure is fatal for the caller. The returned
//! [`Registration`] owns the outbound token manager and deregisters on
//! shutdown.

use crate::error::TrustError;
use crate::issuer_client::IssuerClient;
use crate::key_set_cache::KeySetCache;
use crate::token_manager::{IdentityLossHandler, OutboundTokenManager};
use crate::types::{ComponentIdentity, TokenClass};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// A live registration with the Security-Component.
pub struct Registration {
    issuer: Arc<dyn IssuerClient>,
    component_id: String,
    tokens: OutboundTokenManager,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("component_id", &self.component_id)
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

impl Registration {
    #[must_use]
    pub fn component_id(&self) -> &str {
        &self.component_id
    }

    /// The outbound token manager for this component's calls.
    #[must_use]
    pub fn tokens(&self) -> &OutboundTokenManager {
        &self.tokens
    }

    /// Remove this component from the registry.
    ///
    /// Best-effort: a failure is logged, never retried, and never stops
    /// shutdown.
    #[instrument(skip_all, fields(component_id = %self.component_id))]
    pub async fn deregister(self) {
        let token = self.tokens.current_token();
        match self.issuer.deregister(&token, &self.component_id).await {
            Ok(()) => info!(
                target: "common.bootstrap",
                component_id = %self.component_id,
                "Component deregistered"
            ),
            Err(e) => warn!(
                target: "common.bootstrap",
                component_id = %self.component_id,
                error = %e,
                "Deregistration failed, continuing shutdown"
            ),
        }
    }
}

/// Register, authenticate and optionally warm `cache`.
///
/// # Errors
///
/// - the registry's error (`InvalidCredentials`, `NotFound`,
///   `ServiceUnreachable`) if registration is refused
/// - the issuer's error if a stale registration cannot be reclaimed
/// - the issuer's error if the first authentication fails
/// - `KeySetUnavailable` if the cache cannot be populated
///
/// When warm-up fails after a token was obtained, the registration is
/// rolled back best-effort before returning.
#[instrument(skip_all, fields(component_id = %identity.id))]
pub async fn bootstrap(
    issuer: Arc<dyn IssuerClient>,
    identity: &ComponentIdentity,
    cache: Option<&KeySetCache>,
    on_identity_loss: IdentityLossHandler,
) -> Result<Registration, TrustError> {
    register_or_reclaim(issuer.as_ref(), identity)
        .await
        .map_err(|e| {
            error!(target: "common.bootstrap", error = %e, "Component registration failed");
            e
        })?;
    info!(
        target: "common.bootstrap",
        component_id = %identity.id,
        component_name = %identity.name,
        "Component registered"
    );

    let tokens =
        OutboundTokenManager::start(issuer.clone(), identity, on_identity_loss)
            .await
            .map_err(|e| {
                error!(
                    target: "common.bootstrap",
                    error = %e,
                    "Initial component authentication failed"
                );
                e
            })?;

    let registration = Registration {
        issuer,
        component_id: identity.id.clone(),
        tokens,
    };

    if let Some(cache) = cache {
        match cache.refresh().await {
            Ok(count) => info!(
                target: "common.bootstrap",
                key_count = count,
                "Key-set cache warmed"
            ),
            Err(e) => {
                error!(target: "common.bootstrap", error = %e, "Key-set cache warm-up failed");
                registration.deregister().await;
                return Err(TrustError::KeySetUnavailable);
            }
        }
    }

    Ok(registration)
}

/// Register `identity`, replacing a registration left by a previous
/// instance that exited without deregistering.
///
/// The registry checks the secret before answering `AlreadyRegistered`,
/// and only the secret's holder can obtain a token to deregister the id.
async fn register_or_reclaim(
    issuer: &dyn IssuerClient,
    identity: &ComponentIdentity,
) -> Result<(), TrustError> {
    match issuer.register(identity).await {
        Err(TrustError::AlreadyRegistered(_)) => {
            warn!(
                target: "common.bootstrap",
                component_id = %identity.id,
                "Component id already registered, reclaiming stale registration"
            );
            let stale = issuer
                .authenticate(&identity.id, &identity.secret, TokenClass::Component)
                .await?;
            issuer.deregister(&stale.token, &identity.id).await?;
            issuer.register(identity).await
        }
        other => other,
    }
}
