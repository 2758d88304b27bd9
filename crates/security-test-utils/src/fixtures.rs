//! Key and credential-store fixtures.

use common::testing::test_rsa_key;
use common::types::ComponentIdentity;
use common::secret::ExposeSecret;
use security_service::crypto::{hash_secret, KeyManager, KeyManagerConfig};
use security_service::repositories::{
    AllowListEntry, ComponentRepository, InMemoryComponentRepository, InMemoryUserRepository,
    RegisteredComponent, UserRecord, UserRepository,
};
use security_service::services::{Issuer, Registry};
use std::sync::Arc;
use uuid::Uuid;

use crate::in_process::InProcessIssuer;

/// bcrypt cost used by every fixture. Far below the production minimum so
/// tests stay fast.
pub const TEST_BCRYPT_COST: u32 = 4;

/// A `KeyManager` over the cached test keys 0 (user) and 1 (component).
pub fn test_key_manager(config: KeyManagerConfig) -> Arc<KeyManager> {
    Arc::new(
        KeyManager::with_keys(config, test_rsa_key(0), test_rsa_key(1))
            .expect("test keys should encode"),
    )
}

#[derive(Debug, Clone)]
struct SeedUser {
    user_id: Uuid,
    email: String,
    password: String,
}

#[derive(Debug, Clone)]
struct SeedComponent {
    id: String,
    name: String,
    url: String,
    secret: String,
    registered: bool,
}

/// Builder for seeded in-memory credential stores.
///
/// # Example
/// ```rust,ignore
/// let seed = TestSeed::new()
///     .with_user("alice@bank.test", "pw-alice")
///     .with_registered_component(&test_identity("c1"));
/// let stores = seed.build().await;
/// ```
#[derive(Debug, Clone, Default)]
pub struct TestSeed {
    users: Vec<SeedUser>,
    components: Vec<SeedComponent>,
}

impl TestSeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user with a fresh user id.
    pub fn with_user(mut self, email: &str, password: &str) -> Self {
        self.users.push(SeedUser {
            user_id: Uuid::new_v4(),
            email: email.to_string(),
            password: password.to_string(),
        });
        self
    }

    /// Put a component on the allow-list without registering it.
    pub fn with_component(self, identity: &ComponentIdentity) -> Self {
        self.push_component(identity, false)
    }

    /// Allow-list and register a component, so it can authenticate at once.
    pub fn with_registered_component(self, identity: &ComponentIdentity) -> Self {
        self.push_component(identity, true)
    }

    fn push_component(mut self, identity: &ComponentIdentity, registered: bool) -> Self {
        self.components.push(SeedComponent {
            id: identity.id.clone(),
            name: identity.name.clone(),
            url: identity.url.clone(),
            secret: identity.secret.expose_secret().to_string(),
            registered,
        });
        self
    }

    /// Id assigned to the user with `email`.
    pub fn user_id(&self, email: &str) -> Option<Uuid> {
        self.users
            .iter()
            .find(|u| u.email == email)
            .map(|u| u.user_id)
    }

    /// Build the stores, hashing every secret at [`TEST_BCRYPT_COST`].
    pub async fn build(&self) -> TestStores {
        let users = Arc::new(InMemoryUserRepository::new());
        for user in &self.users {
            users
                .insert(UserRecord {
                    user_id: user.user_id,
                    email: user.email.clone(),
                    password_hash: hash_secret(&user.password, TEST_BCRYPT_COST)
                        .expect("hashing should succeed"),
                })
                .await
                .expect("seed users should be unique");
        }

        let components = Arc::new(InMemoryComponentRepository::default());
        for component in &self.components {
            let secret_hash =
                hash_secret(&component.secret, TEST_BCRYPT_COST).expect("hashing should succeed");
            components.allow(AllowListEntry {
                component_id: component.id.clone(),
                component_name: component.name.clone(),
                secret_hash: secret_hash.clone(),
            });
            if component.registered {
                components
                    .insert_if_absent(RegisteredComponent {
                        component_id: component.id.clone(),
                        component_name: component.name.clone(),
                        component_url: component.url.clone(),
                        secret_hash,
                        registered_at: chrono::Utc::now(),
                    })
                    .await
                    .expect("in-memory insert should succeed");
            }
        }

        TestStores { users, components }
    }
}

/// Stores built by [`TestSeed::build`]; kept concrete so tests can inspect them.
#[derive(Debug, Clone)]
pub struct TestStores {
    pub users: Arc<InMemoryUserRepository>,
    pub components: Arc<InMemoryComponentRepository>,
}

/// A real Issuer and Registry over seeded stores.
#[derive(Debug, Clone)]
pub struct TestIssuer {
    pub keys: Arc<KeyManager>,
    pub issuer: Arc<Issuer>,
    pub registry: Arc<Registry>,
    pub stores: TestStores,
}

impl TestIssuer {
    pub async fn new(seed: &TestSeed) -> Self {
        Self::with_config(seed, KeyManagerConfig::default()).await
    }

    pub async fn with_config(seed: &TestSeed, config: KeyManagerConfig) -> Self {
        let stores = seed.build().await;
        let keys = test_key_manager(config);
        let issuer = Issuer::new(
            keys.clone(),
            stores.users.clone() as Arc<dyn UserRepository>,
            stores.components.clone() as Arc<dyn ComponentRepository>,
            TEST_BCRYPT_COST,
        )
        .expect("issuer should build");
        let registry = Registry::new(stores.components.clone() as Arc<dyn ComponentRepository>);

        Self {
            keys,
            issuer: Arc::new(issuer),
            registry: Arc::new(registry),
            stores,
        }
    }

    /// An `IssuerClient` calling this issuer directly.
    pub fn client(&self) -> InProcessIssuer {
        InProcessIssuer::new(self.issuer.clone(), self.registry.clone())
    }
}
