//! Component registry.
//!
//! Registration is gated by the allow-list: the id must be listed, and the
//! presented name and secret must match the listed facts. Credentials are
//! checked before the duplicate check, so only a holder of the secret can
//! learn whether an id is currently registered.

use crate::crypto::verify_secret;
use crate::errors::SecurityError;
use crate::observability::metrics::record_registration;
use crate::repositories::{ComponentRepository, RegisteredComponent};
use chrono::Utc;
use common::secret::ExposeSecret;
use common::types::{AuthenticatedSubject, RegistrationRequest, TokenClass};
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub struct Registry {
    components: Arc<dyn ComponentRepository>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").finish_non_exhaustive()
    }
}

impl Registry {
    pub fn new(components: Arc<dyn ComponentRepository>) -> Self {
        Self { components }
    }

    /// Register a component.
    ///
    /// # Errors
    ///
    /// - `BadRequest` if a field is blank
    /// - `NotFound` if the id is not on the allow-list
    /// - `InvalidCredentials` if the name or secret does not match
    /// - `AlreadyRegistered` if the id is already registered
    #[instrument(skip_all, fields(component_id = %request.component_id, status))]
    pub async fn register(&self, request: RegistrationRequest) -> Result<(), SecurityError> {
        let result = self.register_inner(request).await;

        let status = if result.is_ok() { "success" } else { "error" };
        tracing::Span::current().record("status", status);
        record_registration("register", status);

        result
    }

    async fn register_inner(&self, request: RegistrationRequest) -> Result<(), SecurityError> {
        let RegistrationRequest {
            component_id,
            component_name,
            component_secret,
            component_url,
        } = request;

        if component_id.trim().is_empty()
            || component_name.trim().is_empty()
            || component_url.trim().is_empty()
        {
            return Err(SecurityError::BadRequest(
                "component_id, component_name and component_url are required".to_string(),
            ));
        }

        let entry = self
            .components
            .allow_list_entry(&component_id)
            .await?
            .ok_or_else(|| SecurityError::NotFound(format!("component {component_id}")))?;

        let hash = entry.secret_hash.clone();
        let secret_matches = tokio::task::spawn_blocking(move || {
            verify_secret(component_secret.expose_secret(), &hash)
        })
        .await
        .map_err(|e| SecurityError::Internal(format!("Secret verification task failed: {e}")))??;

        if !secret_matches || entry.component_name != component_name {
            warn!(
                target: "security.registry",
                component_id = %component_id,
                "Registration facts do not match allow-list"
            );
            return Err(SecurityError::InvalidCredentials);
        }

        let inserted = self
            .components
            .insert_if_absent(RegisteredComponent {
                component_id: component_id.clone(),
                component_name: component_name.clone(),
                component_url: component_url.clone(),
                secret_hash: entry.secret_hash,
                registered_at: Utc::now(),
            })
            .await?;
        if !inserted {
            return Err(SecurityError::AlreadyRegistered(component_id));
        }

        info!(
            target: "security.registry",
            component_id = %component_id,
            component_name = %component_name,
            component_url = %component_url,
            "Component registered"
        );
        Ok(())
    }

    /// Remove `component_id` from the registry.
    ///
    /// Only the component itself may deregister: the caller's component
    /// token must carry the same subject.
    ///
    /// # Errors
    ///
    /// - `Forbidden` if the caller is not the component being removed
    /// - `NotFound` if the id is not registered
    #[instrument(skip_all, fields(component_id = %component_id, status))]
    pub async fn deregister(
        &self,
        caller: &AuthenticatedSubject,
        component_id: &str,
    ) -> Result<(), SecurityError> {
        let result = self.deregister_inner(caller, component_id).await;

        let status = if result.is_ok() { "success" } else { "error" };
        tracing::Span::current().record("status", status);
        record_registration("deregister", status);

        result
    }

    async fn deregister_inner(
        &self,
        caller: &AuthenticatedSubject,
        component_id: &str,
    ) -> Result<(), SecurityError> {
        if caller.token_class != TokenClass::Component || caller.subject != component_id {
            return Err(SecurityError::Forbidden(
                "A component may only deregister itself".to_string(),
            ));
        }

        if !self.components.remove(component_id).await? {
            return Err(SecurityError::NotFound(format!("component {component_id}")));
        }

        info!(target: "security.registry", component_id = %component_id, "Component deregistered");
        Ok(())
    }
}
