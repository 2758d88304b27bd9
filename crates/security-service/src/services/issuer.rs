//! Token issuance and server-side token authentication.
//!
//! [`Issuer::authenticate`] exchanges credentials for a signed token.
//! Unknown principals and wrong secrets are indistinguishable: bcrypt runs
//! either way, against a dummy hash when the principal is unknown, and both
//! fail with `InvalidCredentials`.

use crate::crypto::{hash_secret, verify_secret, KeyManager, MintedToken};
use crate::errors::SecurityError;
use crate::observability::metrics::{record_token_authentication, record_token_issuance};
use crate::repositories::{ComponentRepository, UserRepository};
use common::error::{TrustError, INVALID_TOKEN_REASON};
use common::key_set::KeySet;
use common::secret::{ExposeSecret, SecretString};
use common::types::{AuthenticatedSubject, TokenClass};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// Input for the dummy hash verified when a principal is unknown.
const DUMMY_SECRET: &str = "unknown-principal-timing-equaliser";

pub struct Issuer {
    keys: Arc<KeyManager>,
    users: Arc<dyn UserRepository>,
    components: Arc<dyn ComponentRepository>,
    dummy_hash: String,
}

impl fmt::Debug for Issuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Issuer")
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}

impl Issuer {
    /// Build an issuer. Hashes the dummy secret at `bcrypt_cost` so the
    /// unknown-principal path costs the same as a real verification.
    ///
    /// Blocking: call from `spawn_blocking` when a runtime is running.
    ///
    /// # Errors
    ///
    /// Returns `SecurityError::Crypto` if the dummy hash cannot be created.
    pub fn new(
        keys: Arc<KeyManager>,
        users: Arc<dyn UserRepository>,
        components: Arc<dyn ComponentRepository>,
        bcrypt_cost: u32,
    ) -> Result<Self, SecurityError> {
        Ok(Self {
            keys,
            users,
            components,
            dummy_hash: hash_secret(DUMMY_SECRET, bcrypt_cost)?,
        })
    }

    pub fn keys(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    /// Exchange credentials for a token of `class`.
    ///
    /// Users are looked up by email or user id; components by component
    /// id, and only while registered.
    ///
    /// # Errors
    ///
    /// - `InvalidCredentials` if the principal is unknown or the secret is wrong
    /// - `Crypto`/`Internal` if hashing or signing fails
    #[instrument(skip_all, fields(token_class = %class, status))]
    pub async fn authenticate(
        &self,
        principal: &str,
        credentials: &SecretString,
        class: TokenClass,
    ) -> Result<MintedToken, SecurityError> {
        let start = Instant::now();
        let result = self.authenticate_inner(principal, credentials, class).await;

        let status = if result.is_ok() { "success" } else { "error" };
        tracing::Span::current().record("status", status);
        record_token_issuance(class.as_str(), status, start.elapsed());

        result
    }

    async fn authenticate_inner(
        &self,
        principal: &str,
        credentials: &SecretString,
        class: TokenClass,
    ) -> Result<MintedToken, SecurityError> {
        let found = match class {
            TokenClass::User => self
                .users
                .find_by_principal(principal)
                .await?
                .map(|u| (u.user_id.to_string(), u.password_hash)),
            TokenClass::Component => self
                .components
                .registered(principal)
                .await?
                .map(|c| (c.component_id, c.secret_hash)),
        };

        let (subject, hash) = match found {
            Some((subject, hash)) => (Some(subject), hash),
            None => (None, self.dummy_hash.clone()),
        };

        let secret = credentials.clone();
        let secret_matches =
            tokio::task::spawn_blocking(move || verify_secret(secret.expose_secret(), &hash))
                .await
                .map_err(|e| SecurityError::Internal(format!("Secret verification task failed: {e}")))??;

        let subject = match subject {
            Some(subject) if secret_matches => subject,
            _ => {
                debug!(target: "security.issuer", token_class = %class, "Credential check failed");
                return Err(SecurityError::InvalidCredentials);
            }
        };

        let minted = self.keys.mint(&subject, class)?;
        debug!(
            target: "security.issuer",
            token_class = %class,
            kid = %minted.kid,
            "Token issued"
        );
        Ok(minted)
    }

    /// The currently published key set.
    pub fn key_set(&self) -> KeySet {
        self.keys.publish_key_set()
    }

    /// Verify `token` and confirm its subject still exists.
    ///
    /// `request_path` is the path the token was presented on; it is only
    /// recorded for tracing.
    ///
    /// # Errors
    ///
    /// `AuthenticationFailed` with the expiry reason for expired tokens and
    /// the opaque invalid reason for every other failure, including a
    /// subject that has since been removed.
    #[instrument(skip_all, fields(request_path = %request_path, status))]
    pub async fn authenticate_token(
        &self,
        token: &str,
        request_path: &str,
    ) -> Result<AuthenticatedSubject, SecurityError> {
        let result = self.resolve_subject(token).await;

        let status = if result.is_ok() { "authenticated" } else { "rejected" };
        tracing::Span::current().record("status", status);
        record_token_authentication(status);

        result
    }

    /// As [`Issuer::authenticate_token`] for a caller's own bearer token.
    ///
    /// # Errors
    ///
    /// Same as [`Issuer::authenticate_token`].
    pub async fn authenticate_caller(
        &self,
        token: &str,
    ) -> Result<AuthenticatedSubject, SecurityError> {
        self.resolve_subject(token).await
    }

    async fn resolve_subject(&self, token: &str) -> Result<AuthenticatedSubject, SecurityError> {
        let claims = self
            .keys
            .verify(token)
            .map_err(|e| SecurityError::from(TrustError::from(e)))?;

        let exists = match claims.token_class {
            TokenClass::User => self.users.find_by_id(&claims.sub).await?.is_some(),
            TokenClass::Component => self.components.registered(&claims.sub).await?.is_some(),
        };
        if !exists {
            warn!(
                target: "security.issuer",
                token_class = %claims.token_class,
                "Valid token for a subject that no longer exists"
            );
            return Err(SecurityError::AuthenticationFailed(
                INVALID_TOKEN_REASON.to_string(),
            ));
        }

        Ok(AuthenticatedSubject {
            subject: claims.sub,
            token_class: claims.token_class,
        })
    }
}
