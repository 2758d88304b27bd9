//! Component allow-list and registry.
//!
//! The allow-list holds the facts a component must present to register.
//! The registry holds the components currently registered; only those may
//! authenticate.

use crate::errors::SecurityError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;

/// A component permitted to register.
#[derive(Clone)]
pub struct AllowListEntry {
    pub component_id: String,
    pub component_name: String,
    pub secret_hash: String,
}

impl fmt::Debug for AllowListEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllowListEntry")
            .field("component_id", &self.component_id)
            .field("component_name", &self.component_name)
            .field("secret_hash", &"[REDACTED]")
            .finish()
    }
}

/// A component currently present in the registry.
#[derive(Clone)]
pub struct RegisteredComponent {
    pub component_id: String,
    pub component_name: String,
    pub component_url: String,
    pub secret_hash: String,
    pub registered_at: DateTime<Utc>,
}

impl fmt::Debug for RegisteredComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredComponent")
            .field("component_id", &self.component_id)
            .field("component_name", &self.component_name)
            .field("component_url", &self.component_url)
            .field("secret_hash", &"[REDACTED]")
            .field("registered_at", &self.registered_at)
            .finish()
    }
}

#[async_trait]
pub trait ComponentRepository: Send + Sync {
    async fn allow_list_entry(
        &self,
        component_id: &str,
    ) -> Result<Option<AllowListEntry>, SecurityError>;

    async fn registered(
        &self,
        component_id: &str,
    ) -> Result<Option<RegisteredComponent>, SecurityError>;

    /// Insert unless the id is already registered. Returns `false` if it was.
    async fn insert_if_absent(&self, component: RegisteredComponent)
        -> Result<bool, SecurityError>;

    /// Remove a registration. Returns `false` if the id was not registered.
    async fn remove(&self, component_id: &str) -> Result<bool, SecurityError>;
}

#[derive(Debug, Default)]
pub struct InMemoryComponentRepository {
    allow_list: RwLock<HashMap<String, AllowListEntry>>,
    registered: RwLock<HashMap<String, RegisteredComponent>>,
}

impl InMemoryComponentRepository {
    pub fn new(allow_list: impl IntoIterator<Item = AllowListEntry>) -> Self {
        Self {
            allow_list: RwLock::new(
                allow_list
                    .into_iter()
                    .map(|e| (e.component_id.clone(), e))
                    .collect(),
            ),
            registered: RwLock::new(HashMap::new()),
        }
    }

    pub fn allow(&self, entry: AllowListEntry) {
        self.allow_list
            .write()
            .insert(entry.component_id.clone(), entry);
    }

    pub fn registered_count(&self) -> usize {
        self.registered.read().len()
    }
}

#[async_trait]
impl ComponentRepository for InMemoryComponentRepository {
    async fn allow_list_entry(
        &self,
        component_id: &str,
    ) -> Result<Option<AllowListEntry>, SecurityError> {
        Ok(self.allow_list.read().get(component_id).cloned())
    }

    async fn registered(
        &self,
        component_id: &str,
    ) -> Result<Option<RegisteredComponent>, SecurityError> {
        Ok(self.registered.read().get(component_id).cloned())
    }

    async fn insert_if_absent(
        &self,
        component: RegisteredComponent,
    ) -> Result<bool, SecurityError> {
        let mut registered = self.registered.write();
        if registered.contains_key(&component.component_id) {
            return Ok(false);
        }
        registered.insert(component.component_id.clone(), component);
        Ok(true)
    }

    async fn remove(&self, component_id: &str) -> Result<bool, SecurityError> {
        Ok(self.registered.write().remove(component_id).is_some())
    }
}
