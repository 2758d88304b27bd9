//! Seed data for the credential stores.
//!
//! The seed file is JSON:
//!
//! ```json
//! {
//!   "users": [
//!     { "user_id": "…uuid…", "email": "alice@bank.test", "password": "…" }
//!   ],
//!   "components": [
//!     { "component_id": "7f9c1d2e", "component_name": "gateway", "secret_hash": "$2b$12$…" }
//!   ]
//! }
//! ```
//!
//! Each entry carries either a plaintext secret (`password` / `secret`),
//! hashed on load, or a precomputed bcrypt hash (`password_hash` /
//! `secret_hash`). `user_id` is optional and generated when absent.

use crate::crypto::hash_secret;
use crate::errors::SecurityError;
use crate::repositories::{AllowListEntry, UserRecord};
use common::secret::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedData {
    #[serde(default)]
    pub users: Vec<SeedUser>,
    #[serde(default)]
    pub components: Vec<SeedComponent>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedUser {
    #[serde(default)]
    pub user_id: Option<Uuid>,
    pub email: String,
    #[serde(default)]
    pub password: Option<SecretString>,
    #[serde(default)]
    pub password_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedComponent {
    pub component_id: String,
    pub component_name: String,
    #[serde(default)]
    pub secret: Option<SecretString>,
    #[serde(default)]
    pub secret_hash: Option<String>,
}

impl SeedData {
    /// Parse seed data from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns `SecurityError::Seed` for malformed JSON.
    pub fn from_json(json: &str) -> Result<Self, SecurityError> {
        serde_json::from_str(json).map_err(|e| SecurityError::Seed(format!("Invalid seed JSON: {e}")))
    }

    /// Read and parse a seed file.
    ///
    /// # Errors
    ///
    /// Returns `SecurityError::Seed` if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, SecurityError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            SecurityError::Seed(format!("Cannot read seed file {}: {e}", path.display()))
        })?;
        let seed = Self::from_json(&json)?;
        info!(
            target: "security.seed",
            path = %path.display(),
            users = seed.users.len(),
            components = seed.components.len(),
            "Seed file loaded"
        );
        Ok(seed)
    }

    /// Validate the seed and hash plaintext secrets at `bcrypt_cost`.
    ///
    /// Blocking: call from `spawn_blocking` when a runtime is running.
    ///
    /// # Errors
    ///
    /// Returns `SecurityError::Seed` for duplicate ids or emails, entries
    /// with neither or both of plaintext and hash, and blank fields.
    pub fn into_records(
        self,
        bcrypt_cost: u32,
    ) -> Result<(Vec<UserRecord>, Vec<AllowListEntry>), SecurityError> {
        let mut user_ids = HashSet::new();
        let mut emails = HashSet::new();
        let mut users = Vec::with_capacity(self.users.len());

        for user in self.users {
            let email = user.email.trim().to_string();
            if email.is_empty() {
                return Err(SecurityError::Seed("User with blank email".to_string()));
            }
            let user_id = user.user_id.unwrap_or_else(Uuid::new_v4);
            if !user_ids.insert(user_id) || !emails.insert(email.to_ascii_lowercase()) {
                return Err(SecurityError::Seed(format!(
                    "Duplicate user {user_id} in seed data"
                )));
            }
            let password_hash = resolve_hash(
                user.password.as_ref(),
                user.password_hash,
                bcrypt_cost,
                &format!("user {user_id}"),
            )?;
            users.push(UserRecord {
                user_id,
                email,
                password_hash,
            });
        }

        let mut component_ids = HashSet::new();
        let mut allow_list = Vec::with_capacity(self.components.len());

        for component in self.components {
            let component_id = component.component_id.trim().to_string();
            let component_name = component.component_name.trim().to_string();
            if component_id.is_empty() || component_name.is_empty() {
                return Err(SecurityError::Seed(
                    "Component with blank id or name".to_string(),
                ));
            }
            if !component_ids.insert(component_id.clone()) {
                return Err(SecurityError::Seed(format!(
                    "Duplicate component {component_id} in seed data"
                )));
            }
            let secret_hash = resolve_hash(
                component.secret.as_ref(),
                component.secret_hash,
                bcrypt_cost,
                &format!("component {component_id}"),
            )?;
            allow_list.push(AllowListEntry {
                component_id,
                component_name,
                secret_hash,
            });
        }

        Ok((users, allow_list))
    }
}

fn resolve_hash(
    plaintext: Option<&SecretString>,
    hash: Option<String>,
    bcrypt_cost: u32,
    what: &str,
) -> Result<String, SecurityError> {
    match (plaintext, hash) {
        (Some(secret), None) => hash_secret(secret.expose_secret(), bcrypt_cost),
        (None, Some(hash)) if hash.starts_with("$2") => Ok(hash),
        (None, Some(_)) => Err(SecurityError::Seed(format!(
            "{what}: hash is not a bcrypt hash"
        ))),
        (Some(_), Some(_)) => Err(SecurityError::Seed(format!(
            "{what}: give either a secret or a hash, not both"
        ))),
        (None, None) => Err(SecurityError::Seed(format!("{what}: missing secret"))),
    }
}
