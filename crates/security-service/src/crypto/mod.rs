//! Signing key management.
//!
//! [`KeyManager`] owns one RSA key pair per token class. Private keys never
//! leave the process and are redacted in `Debug`. Rotation installs a new
//! active key and keeps the previous one published until its retirement
//! deadline so tokens it signed still verify.

use crate::errors::SecurityError;
use chrono::{DateTime, Utc};
use common::jwt::{TokenClaims, DEFAULT_CLOCK_SKEW, DEFAULT_TOKEN_LIFETIME, SIGNING_ALGORITHM, TOKEN_TYPE};
use common::key_set::{JsonWebKey, KeySet};
use common::types::TokenClass;
use common::verifier::{token_kid, verify_with_key, VerifyError};
use jsonwebtoken::{encode, DecodingKey, EncodingKey, Header};
use parking_lot::RwLock;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use std::fmt;
use std::time::Duration;
use tracing::{info, instrument};

/// RSA modulus size for generated keys.
pub const RSA_KEY_BITS: usize = 2048;

/// Lifetime and rotation settings for [`KeyManager`].
#[derive(Debug, Clone, Copy)]
pub struct KeyManagerConfig {
    pub token_lifetime: Duration,
    /// How long a rotated-out key stays published. Zero drops it at once.
    pub rotation_grace: Duration,
    pub clock_skew: Duration,
}

impl Default for KeyManagerConfig {
    fn default() -> Self {
        Self {
            token_lifetime: DEFAULT_TOKEN_LIFETIME,
            rotation_grace: DEFAULT_TOKEN_LIFETIME,
            clock_skew: DEFAULT_CLOCK_SKEW,
        }
    }
}

/// Generate a fresh RSA private key with the OS CSPRNG.
///
/// Slow (hundreds of milliseconds); call from a blocking context.
///
/// # Errors
///
/// Returns `SecurityError::Crypto` if key generation fails.
pub fn generate_rsa_key() -> Result<RsaPrivateKey, SecurityError> {
    let mut rng = rand::rngs::OsRng;
    RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
        .map_err(|e| SecurityError::Crypto(format!("RSA key generation failed: {e}")))
}

/// Key id in the form `{class}-{yyyymmdd}-{n}`.
///
/// `n` is random so a restarted process never reuses a kid that verifiers
/// may still have cached with a different key.
fn new_kid(class: TokenClass, now: DateTime<Utc>) -> String {
    format!(
        "{}-{}-{:08x}",
        class,
        now.format("%Y%m%d"),
        rand::random::<u32>()
    )
}

/// Hash a password or shared secret with bcrypt.
///
/// The cost is validated by `Config`; test fixtures use lower costs.
///
/// # Errors
///
/// Returns `SecurityError::Crypto` if bcrypt rejects the cost or fails.
#[instrument(skip_all)]
pub fn hash_secret(secret: &str, cost: u32) -> Result<String, SecurityError> {
    bcrypt::hash(secret, cost)
        .map_err(|e| SecurityError::Crypto(format!("Secret hashing failed: {e}")))
}

/// Verify a secret against a bcrypt hash.
///
/// # Errors
///
/// Returns `SecurityError::Crypto` if the stored hash is malformed.
#[instrument(skip_all)]
pub fn verify_secret(secret: &str, hash: &str) -> Result<bool, SecurityError> {
    bcrypt::verify(secret, hash)
        .map_err(|e| SecurityError::Crypto(format!("Secret verification failed: {e}")))
}

/// A key pair ready for signing.
struct SigningKey {
    kid: String,
    encoding: EncodingKey,
    decoding: DecodingKey,
    public: JsonWebKey,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("private_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    fn from_rsa(kid: String, key: &RsaPrivateKey) -> Result<Self, SecurityError> {
        let der = key
            .to_pkcs1_der()
            .map_err(|e| SecurityError::Crypto(format!("PKCS#1 encoding failed: {e}")))?;
        let modulus = key.n().to_bytes_be();
        let exponent = key.e().to_bytes_be();

        Ok(Self {
            encoding: EncodingKey::from_rsa_der(der.as_bytes()),
            decoding: DecodingKey::from_rsa_raw_components(&modulus, &exponent),
            public: JsonWebKey::rsa(kid.clone(), &modulus, &exponent),
            kid,
        })
    }
}

/// Public half of a rotated-out key, kept until `retire_at`.
struct RetiringKey {
    kid: String,
    decoding: DecodingKey,
    public: JsonWebKey,
    retire_at: i64,
}

struct ClassKeys {
    active: SigningKey,
    retiring: Vec<RetiringKey>,
}

impl ClassKeys {
    fn prune(&mut self, now: i64) {
        self.retiring.retain(|k| k.retire_at > now);
    }
}

struct Keyring {
    user: ClassKeys,
    component: ClassKeys,
}

impl Keyring {
    fn class(&self, class: TokenClass) -> &ClassKeys {
        match class {
            TokenClass::User => &self.user,
            TokenClass::Component => &self.component,
        }
    }

    fn class_mut(&mut self, class: TokenClass) -> &mut ClassKeys {
        match class {
            TokenClass::User => &mut self.user,
            TokenClass::Component => &mut self.component,
        }
    }
}

/// A signed token and the facts the caller reports back.
#[derive(Clone)]
pub struct MintedToken {
    pub token: String,
    pub kid: String,
    pub expires_in: u64,
}

impl fmt::Debug for MintedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MintedToken")
            .field("token", &"[REDACTED]")
            .field("kid", &self.kid)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Owns the signing keys for both token classes.
pub struct KeyManager {
    keys: RwLock<Keyring>,
    config: KeyManagerConfig,
}

impl fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys = self.keys.read();
        f.debug_struct("KeyManager")
            .field("user", &keys.user.active)
            .field("component", &keys.component.active)
            .field(
                "retiring",
                &(keys.user.retiring.len() + keys.component.retiring.len()),
            )
            .field("config", &self.config)
            .finish()
    }
}

impl KeyManager {
    /// Generate one key pair per class.
    ///
    /// # Errors
    ///
    /// Returns `SecurityError::Crypto` if generation fails.
    #[instrument(skip_all)]
    pub fn generate(config: KeyManagerConfig) -> Result<Self, SecurityError> {
        let manager = Self::with_keys(config, &generate_rsa_key()?, &generate_rsa_key()?)?;
        info!(
            target: "security.crypto",
            user_kid = %manager.active_kid(TokenClass::User),
            component_kid = %manager.active_kid(TokenClass::Component),
            "Signing keys generated"
        );
        Ok(manager)
    }

    /// Build a manager around existing keys.
    ///
    /// # Errors
    ///
    /// Returns `SecurityError::Crypto` if a key cannot be encoded.
    pub fn with_keys(
        config: KeyManagerConfig,
        user_key: &RsaPrivateKey,
        component_key: &RsaPrivateKey,
    ) -> Result<Self, SecurityError> {
        let now = Utc::now();
        let keyring = Keyring {
            user: ClassKeys {
                active: SigningKey::from_rsa(new_kid(TokenClass::User, now), user_key)?,
                retiring: Vec::new(),
            },
            component: ClassKeys {
                active: SigningKey::from_rsa(new_kid(TokenClass::Component, now), component_key)?,
                retiring: Vec::new(),
            },
        };
        Ok(Self {
            keys: RwLock::new(keyring),
            config,
        })
    }

    pub fn config(&self) -> &KeyManagerConfig {
        &self.config
    }

    /// Kid of the key currently signing `class` tokens.
    pub fn active_kid(&self, class: TokenClass) -> String {
        self.keys.read().class(class).active.kid.clone()
    }

    /// Sign a token for `subject` issued now.
    ///
    /// # Errors
    ///
    /// Returns `SecurityError::Crypto` if signing fails.
    pub fn mint(&self, subject: &str, class: TokenClass) -> Result<MintedToken, SecurityError> {
        self.mint_at(subject, class, Utc::now().timestamp())
    }

    /// Sign a token for `subject` issued at `now` (Unix seconds).
    ///
    /// # Errors
    ///
    /// Returns `SecurityError::Crypto` if signing fails.
    #[instrument(skip_all, fields(token_class = %class))]
    pub fn mint_at(
        &self,
        subject: &str,
        class: TokenClass,
        now: i64,
    ) -> Result<MintedToken, SecurityError> {
        let claims = TokenClaims::new(subject.to_string(), class, now, self.config.token_lifetime);

        let keys = self.keys.read();
        let active = &keys.class(class).active;

        let mut header = Header::new(SIGNING_ALGORITHM);
        header.typ = Some(TOKEN_TYPE.to_string());
        header.kid = Some(active.kid.clone());

        let token = encode(&header, &claims, &active.encoding)
            .map_err(|e| SecurityError::Crypto(format!("JWT signing failed: {e}")))?;

        Ok(MintedToken {
            token,
            kid: active.kid.clone(),
            expires_in: self.config.token_lifetime.as_secs(),
        })
    }

    /// Public keys of every published key: both active keys plus retiring
    /// keys still inside their grace window.
    pub fn publish_key_set(&self) -> KeySet {
        self.publish_key_set_at(Utc::now().timestamp())
    }

    /// As [`KeyManager::publish_key_set`] at an explicit time.
    pub fn publish_key_set_at(&self, now: i64) -> KeySet {
        let mut keys = self.keys.write();
        let mut published = Vec::new();
        for class in TokenClass::ALL {
            let class_keys = keys.class_mut(class);
            class_keys.prune(now);
            published.push(class_keys.active.public.clone());
            published.extend(class_keys.retiring.iter().map(|k| k.public.clone()));
        }
        KeySet { keys: published }
    }

    /// Replace the signing key of `class` with a freshly generated one.
    ///
    /// # Errors
    ///
    /// Returns `SecurityError::Crypto` if generation fails.
    pub fn rotate(&self, class: TokenClass) -> Result<String, SecurityError> {
        let key = generate_rsa_key()?;
        self.rotate_with_key(class, &key, Utc::now())
    }

    /// Install `key` as the signing key of `class` at `now`.
    ///
    /// The previous key stays published for the rotation grace window.
    ///
    /// # Errors
    ///
    /// Returns `SecurityError::Crypto` if the key cannot be encoded.
    #[instrument(skip_all, fields(token_class = %class))]
    pub fn rotate_with_key(
        &self,
        class: TokenClass,
        key: &RsaPrivateKey,
        now: DateTime<Utc>,
    ) -> Result<String, SecurityError> {
        let new_key = SigningKey::from_rsa(new_kid(class, now), key)?;
        let new_kid = new_key.kid.clone();

        #[allow(clippy::cast_possible_wrap)]
        let grace_secs = self.config.rotation_grace.as_secs() as i64;
        let now_ts = now.timestamp();

        let mut keys = self.keys.write();
        let class_keys = keys.class_mut(class);
        let old = std::mem::replace(&mut class_keys.active, new_key);

        if grace_secs > 0 {
            class_keys.retiring.push(RetiringKey {
                kid: old.kid.clone(),
                decoding: old.decoding,
                public: old.public,
                retire_at: now_ts.saturating_add(grace_secs),
            });
        }
        class_keys.prune(now_ts);

        info!(
            target: "security.crypto",
            token_class = %class,
            old_kid = %old.kid,
            new_kid = %new_kid,
            grace_secs = grace_secs,
            "Signing key rotated"
        );

        Ok(new_kid)
    }

    /// Verification key for `kid`, if it is currently published.
    pub fn public_key(&self, kid: &str) -> Option<DecodingKey> {
        self.public_key_at(kid, Utc::now().timestamp())
    }

    fn public_key_at(&self, kid: &str, now: i64) -> Option<DecodingKey> {
        let keys = self.keys.read();
        TokenClass::ALL.iter().find_map(|class| {
            let class_keys = keys.class(*class);
            if class_keys.active.kid == kid {
                return Some(class_keys.active.decoding.clone());
            }
            class_keys
                .retiring
                .iter()
                .find(|k| k.kid == kid && k.retire_at > now)
                .map(|k| k.decoding.clone())
        })
    }

    /// Verify a token against this manager's own keys.
    ///
    /// # Errors
    ///
    /// `UnknownKey`, `BadSignature` or `Expired`.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, VerifyError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// As [`KeyManager::verify`] at an explicit time.
    ///
    /// # Errors
    ///
    /// `UnknownKey`, `BadSignature` or `Expired`.
    pub fn verify_at(&self, token: &str, now: i64) -> Result<TokenClaims, VerifyError> {
        let kid = token_kid(token)?;
        let key = self.public_key_at(&kid, now).ok_or(VerifyError::UnknownKey)?;
        let claims = verify_with_key(token, &key, now, self.config.clock_skew)?;

        // A token signed by the user key must not pass as a component token
        let signed_class = if kid.starts_with(TokenClass::Component.as_str()) {
            TokenClass::Component
        } else {
            TokenClass::User
        };
        if claims.token_class != signed_class {
            return Err(VerifyError::BadSignature);
        }
        Ok(claims)
    }
}
