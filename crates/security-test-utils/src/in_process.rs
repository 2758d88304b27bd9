//! `IssuerClient` that calls the real Issuer in-process.
//!
//! Exercises the same service code as the HTTP endpoints, minus transport,
//! so trust-layer tests can run against genuine tokens and registry rules.

use async_trait::async_trait;
use common::error::TrustError;
use common::issuer_client::{IssuedToken, IssuerClient};
use common::key_set::KeySet;
use common::secret::{ExposeSecret, SecretString};
use common::types::{
    AuthenticatedSubject, ComponentIdentity, RegistrationRequest, TokenClass, TokenVerdict,
};
use security_service::errors::SecurityError;
use security_service::services::{Issuer, Registry};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct InProcessIssuer {
    issuer: Arc<Issuer>,
    registry: Arc<Registry>,
    authenticate_calls: Arc<AtomicU32>,
}

impl InProcessIssuer {
    pub fn new(issuer: Arc<Issuer>, registry: Arc<Registry>) -> Self {
        Self {
            issuer,
            registry,
            authenticate_calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Number of `authenticate` calls made through this client.
    pub fn authenticate_calls(&self) -> u32 {
        self.authenticate_calls.load(Ordering::SeqCst)
    }

    /// Same check the component-token middleware applies.
    async fn caller(&self, bearer: &SecretString) -> Result<AuthenticatedSubject, TrustError> {
        let caller = self
            .issuer
            .authenticate_caller(bearer.expose_secret())
            .await
            .map_err(TrustError::from)?;
        if caller.token_class != TokenClass::Component {
            return Err(TrustError::Forbidden(
                "A component token is required".to_string(),
            ));
        }
        Ok(caller)
    }
}

#[async_trait]
impl IssuerClient for InProcessIssuer {
    async fn authenticate(
        &self,
        principal: &str,
        credentials: &SecretString,
        token_class: TokenClass,
    ) -> Result<IssuedToken, TrustError> {
        self.authenticate_calls.fetch_add(1, Ordering::SeqCst);
        let minted = self
            .issuer
            .authenticate(principal, credentials, token_class)
            .await?;
        Ok(IssuedToken {
            token: SecretString::from(minted.token),
            expires_in: minted.expires_in,
        })
    }

    async fn key_set(&self) -> Result<KeySet, TrustError> {
        Ok(self.issuer.key_set())
    }

    async fn authenticate_token(
        &self,
        bearer: &SecretString,
        token: &str,
        request_path: &str,
    ) -> Result<TokenVerdict, TrustError> {
        self.caller(bearer).await?;
        match self.issuer.authenticate_token(token, request_path).await {
            Ok(subject) => Ok(TokenVerdict::Authenticated(subject)),
            Err(SecurityError::AuthenticationFailed(reason)) => {
                Ok(TokenVerdict::Rejected { reason })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn register(&self, identity: &ComponentIdentity) -> Result<(), TrustError> {
        self.registry
            .register(RegistrationRequest {
                component_id: identity.id.clone(),
                component_name: identity.name.clone(),
                component_secret: identity.secret.clone(),
                component_url: identity.url.clone(),
            })
            .await
            .map_err(TrustError::from)
    }

    async fn deregister(
        &self,
        bearer: &SecretString,
        component_id: &str,
    ) -> Result<(), TrustError> {
        let caller = self.caller(bearer).await?;
        self.registry
            .deregister(&caller, component_id)
            .await
            .map_err(TrustError::from)
    }
}
