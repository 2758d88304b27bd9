//! User credential store.

use crate::errors::SecurityError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// A user as known to the credential store.
#[derive(Clone)]
pub struct UserRecord {
    pub user_id: Uuid,
    pub email: String,
    pub password_hash: String,
}

impl fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserRecord")
            .field("user_id", &self.user_id)
            .field("email", &"[REDACTED]")
            .field("password_hash", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find a user by email (case-insensitive) or by user id.
    async fn find_by_principal(&self, principal: &str) -> Result<Option<UserRecord>, SecurityError>;

    /// Find a user by the id carried in a token's `sub` claim.
    async fn find_by_id(&self, user_id: &str) -> Result<Option<UserRecord>, SecurityError>;

    /// Add a user. Fails with `BadRequest` if the id or email is taken.
    async fn insert(&self, user: UserRecord) -> Result<(), SecurityError>;

    /// Delete a user; returns whether one was removed.
    async fn remove(&self, user_id: Uuid) -> Result<bool, SecurityError>;
}

/// [`UserRepository`] backed by a map guarded by a `RwLock`.
#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<Uuid, UserRecord>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from already-validated records.
    pub fn with_users(users: impl IntoIterator<Item = UserRecord>) -> Self {
        Self {
            users: RwLock::new(users.into_iter().map(|u| (u.user_id, u)).collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_principal(&self, principal: &str) -> Result<Option<UserRecord>, SecurityError> {
        if let Ok(user_id) = Uuid::parse_str(principal) {
            return Ok(self.users.read().get(&user_id).cloned());
        }
        Ok(self
            .users
            .read()
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(principal))
            .cloned())
    }

    async fn find_by_id(&self, user_id: &str) -> Result<Option<UserRecord>, SecurityError> {
        match Uuid::parse_str(user_id) {
            Ok(id) => Ok(self.users.read().get(&id).cloned()),
            Err(_) => Ok(None),
        }
    }

    async fn insert(&self, user: UserRecord) -> Result<(), SecurityError> {
        let mut users = self.users.write();
        if users.contains_key(&user.user_id) {
            return Err(SecurityError::BadRequest(format!(
                "User id {} already exists",
                user.user_id
            )));
        }
        if users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(SecurityError::BadRequest("Email already in use".to_string()));
        }
        users.insert(user.user_id, user);
        Ok(())
    }

    async fn remove(&self, user_id: Uuid) -> Result<bool, SecurityError> {
        Ok(self.users.write().remove(&user_id).is_some())
    }
}
