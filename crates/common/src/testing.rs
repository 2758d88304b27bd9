//! Test fixtures shared across the workspace.
//!
//! Enabled for this crate's own tests and, for other crates, through the
//! `test-utils` feature.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

use crate::error::{TrustError, INVALID_TOKEN_REASON};
use crate::issuer_client::{IssuedToken, IssuerClient};
use crate::jwt::{TokenClaims, SIGNING_ALGORITHM, TOKEN_TYPE};
use crate::key_set::{JsonWebKey, KeySet};
use crate::key_set_cache::KeySetSource;
use crate::secret::{ExposeSecret, SecretString};
use crate::token_manager::IdentityLossHandler;
use crate::types::{ComponentIdentity, TokenClass, TokenVerdict};
use async_trait::async_trait;
use jsonwebtoken::{EncodingKey, Header};
use parking_lot::Mutex;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

// =============================================================================
// RSA Key Fixtures
// =============================================================================

const FIXTURE_KEY_COUNT: usize = 4;
const FIXTURE_KEY_BITS: usize = 2048;

/// A cached 2048-bit RSA key. Indices wrap around the fixture pool.
pub fn test_rsa_key(index: usize) -> &'static RsaPrivateKey {
    static KEYS: OnceLock<Vec<RsaPrivateKey>> = OnceLock::new();
    let keys = KEYS.get_or_init(|| {
        let mut rng = rand::thread_rng();
        (0..FIXTURE_KEY_COUNT)
            .map(|_| RsaPrivateKey::new(&mut rng, FIXTURE_KEY_BITS).expect("rsa keygen"))
            .collect()
    });
    &keys[index % FIXTURE_KEY_COUNT]
}

/// Public half of `key` as a key-set entry.
pub fn json_web_key(kid: &str, key: &RsaPrivateKey) -> JsonWebKey {
    JsonWebKey::rsa(kid, &key.n().to_bytes_be(), &key.e().to_bytes_be())
}

/// Sign `claims` with `key`, putting `kid` in the header.
pub fn sign_token(kid: &str, key: &RsaPrivateKey, claims: &TokenClaims) -> String {
    let der = key.to_pkcs1_der().expect("pkcs1 encode");
    let encoding_key = EncodingKey::from_rsa_der(der.as_bytes());

    let mut header = Header::new(SIGNING_ALGORITHM);
    header.typ = Some(TOKEN_TYPE.to_string());
    header.kid = Some(kid.to_string());

    jsonwebtoken::encode(&header, claims, &encoding_key).expect("sign token")
}

/// Handler that counts identity-loss events instead of exiting.
pub fn recording_identity_loss() -> (IdentityLossHandler, Arc<AtomicU32>) {
    let count = Arc::new(AtomicU32::new(0));
    let counter = count.clone();
    let handler: IdentityLossHandler = Arc::new(move |_err| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    (handler, count)
}

/// A component identity with predictable values.
pub fn test_identity(id: &str) -> ComponentIdentity {
    ComponentIdentity {
        id: id.to_string(),
        name: format!("{id}-name"),
        url: format!("http://{id}:8080"),
        secret: SecretString::from(format!("{id}-secret")),
    }
}

// =============================================================================
// StaticKeySetSource
// =============================================================================

/// In-memory key-set source with a switchable failure mode.
pub struct StaticKeySetSource {
    key_set: Mutex<KeySet>,
    failure: Mutex<Option<TrustError>>,
    fetches: AtomicU32,
}

impl StaticKeySetSource {
    pub fn new(key_set: KeySet) -> Self {
        Self {
            key_set: Mutex::new(key_set),
            failure: Mutex::new(None),
            fetches: AtomicU32::new(0),
        }
    }

    pub fn failing(err: TrustError) -> Self {
        let source = Self::new(KeySet::default());
        source.fail_with(err);
        source
    }

    /// Replace the key set and clear any failure.
    pub fn set_key_set(&self, key_set: KeySet) {
        *self.key_set.lock() = key_set;
        *self.failure.lock() = None;
    }

    pub fn fail_with(&self, err: TrustError) {
        *self.failure.lock() = Some(err);
    }

    /// Number of fetches attempted, failed ones included.
    pub fn fetch_count(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeySetSource for StaticKeySetSource {
    async fn fetch_key_set(&self) -> Result<KeySet, TrustError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failure.lock().clone() {
            return Err(err);
        }
        Ok(self.key_set.lock().clone())
    }
}

// =============================================================================
// MockIssuerClient
// =============================================================================

/// Scriptable [`IssuerClient`].
///
/// `authenticate` issues `token-{n}` where `n` is the call number, unless a
/// result was queued with [`MockIssuerClient::push_authenticate_result`].
pub struct MockIssuerClient {
    failure: Mutex<Option<TrustError>>,
    authenticate_results: Mutex<VecDeque<Result<IssuedToken, TrustError>>>,
    key_set: Mutex<KeySet>,
    verdict: Mutex<Result<TokenVerdict, TrustError>>,
    register_results: Mutex<VecDeque<Result<(), TrustError>>>,
    register_result: Mutex<Result<(), TrustError>>,
    deregister_result: Mutex<Result<(), TrustError>>,
    last_principal: Mutex<Option<String>>,
    last_bearer: Mutex<Option<String>>,
    authenticate_calls: AtomicU32,
    key_set_calls: AtomicU32,
    authenticate_token_calls: AtomicU32,
    register_calls: AtomicU32,
    deregister_calls: AtomicU32,
}

impl Default for MockIssuerClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockIssuerClient {
    pub fn new() -> Self {
        Self {
            failure: Mutex::new(None),
            authenticate_results: Mutex::new(VecDeque::new()),
            key_set: Mutex::new(KeySet::default()),
            verdict: Mutex::new(Ok(TokenVerdict::Rejected {
                reason: INVALID_TOKEN_REASON.to_string(),
            })),
            register_results: Mutex::new(VecDeque::new()),
            register_result: Mutex::new(Ok(())),
            deregister_result: Mutex::new(Ok(())),
            last_principal: Mutex::new(None),
            last_bearer: Mutex::new(None),
            authenticate_calls: AtomicU32::new(0),
            key_set_calls: AtomicU32::new(0),
            authenticate_token_calls: AtomicU32::new(0),
            register_calls: AtomicU32::new(0),
            deregister_calls: AtomicU32::new(0),
        }
    }

    /// Every operation fails with `err` until [`MockIssuerClient::clear_failure`].
    pub fn fail_all_with(&self, err: TrustError) {
        *self.failure.lock() = Some(err);
    }

    pub fn clear_failure(&self) {
        *self.failure.lock() = None;
    }

    pub fn push_authenticate_result(&self, result: Result<IssuedToken, TrustError>) {
        self.authenticate_results.lock().push_back(result);
    }

    pub fn set_key_set(&self, key_set: KeySet) {
        *self.key_set.lock() = key_set;
    }

    pub fn set_verdict(&self, verdict: Result<TokenVerdict, TrustError>) {
        *self.verdict.lock() = verdict;
    }

    pub fn set_register_result(&self, result: Result<(), TrustError>) {
        *self.register_result.lock() = result;
    }

    /// Queue a one-shot `register` result, used before the sticky one.
    pub fn push_register_result(&self, result: Result<(), TrustError>) {
        self.register_results.lock().push_back(result);
    }

    pub fn set_deregister_result(&self, result: Result<(), TrustError>) {
        *self.deregister_result.lock() = result;
    }

    pub fn last_principal(&self) -> Option<String> {
        self.last_principal.lock().clone()
    }

    /// Bearer token presented on the most recent authenticated call.
    pub fn last_bearer(&self) -> Option<String> {
        self.last_bearer.lock().clone()
    }

    pub fn authenticate_calls(&self) -> u32 {
        self.authenticate_calls.load(Ordering::SeqCst)
    }

    pub fn key_set_calls(&self) -> u32 {
        self.key_set_calls.load(Ordering::SeqCst)
    }

    pub fn authenticate_token_calls(&self) -> u32 {
        self.authenticate_token_calls.load(Ordering::SeqCst)
    }

    pub fn register_calls(&self) -> u32 {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn deregister_calls(&self) -> u32 {
        self.deregister_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> u32 {
        self.authenticate_calls()
            + self.key_set_calls()
            + self.authenticate_token_calls()
            + self.register_calls()
            + self.deregister_calls()
    }

    fn check_failure(&self) -> Result<(), TrustError> {
        match self.failure.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl IssuerClient for MockIssuerClient {
    async fn authenticate(
        &self,
        principal: &str,
        _credentials: &SecretString,
        _token_class: TokenClass,
    ) -> Result<IssuedToken, TrustError> {
        let n = self.authenticate_calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_principal.lock() = Some(principal.to_string());
        self.check_failure()?;

        if let Some(result) = self.authenticate_results.lock().pop_front() {
            return result;
        }
        Ok(IssuedToken {
            token: SecretString::from(format!("token-{n}")),
            expires_in: 3600,
        })
    }

    async fn key_set(&self) -> Result<KeySet, TrustError> {
        self.key_set_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        Ok(self.key_set.lock().clone())
    }

    async fn authenticate_token(
        &self,
        bearer: &SecretString,
        _token: &str,
        _request_path: &str,
    ) -> Result<TokenVerdict, TrustError> {
        self.authenticate_token_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_bearer.lock() = Some(bearer.expose_secret().to_string());
        self.check_failure()?;
        self.verdict.lock().clone()
    }

    async fn register(&self, identity: &ComponentIdentity) -> Result<(), TrustError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_principal.lock() = Some(identity.id.clone());
        self.check_failure()?;
        if let Some(result) = self.register_results.lock().pop_front() {
            return result;
        }
        self.register_result.lock().clone()
    }

    async fn deregister(
        &self,
        bearer: &SecretString,
        _component_id: &str,
    ) -> Result<(), TrustError> {
        self.deregister_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_bearer.lock() = Some(bearer.expose_secret().to_string());
        self.check_failure()?;
        self.deregister_result.lock().clone()
    }
}
