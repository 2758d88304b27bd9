//! Builder patterns for test tokens
//!
//! Provides a fluent API for hand-signed tokens, for cases a real
//! `KeyManager` will not produce: foreign keys, unknown kids, future `iat`.

use chrono::Utc;
use common::jwt::TokenClaims;
use common::testing::{sign_token, test_rsa_key};
use common::types::TokenClass;
use std::time::Duration;

/// Builder for signed test tokens
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .for_subject("c1")
///     .token_class(TokenClass::Component)
///     .with_kid("component-20260101-00000001")
///     .signed_with(1)
///     .expired()
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct TestTokenBuilder {
    sub: String,
    token_class: TokenClass,
    iat: i64,
    lifetime: Duration,
    kid: String,
    key_index: usize,
}

impl TestTokenBuilder {
    /// A one-hour component token for `test-subject`, signed with key 1.
    pub fn new() -> Self {
        Self {
            sub: "test-subject".to_string(),
            token_class: TokenClass::Component,
            iat: Utc::now().timestamp(),
            lifetime: Duration::from_secs(3600),
            kid: "component-test-1".to_string(),
            key_index: 1,
        }
    }

    pub fn for_subject(mut self, subject: &str) -> Self {
        self.sub = subject.to_string();
        self
    }

    pub fn token_class(mut self, token_class: TokenClass) -> Self {
        self.token_class = token_class;
        self
    }

    /// Set issued-at timestamp
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.iat = timestamp;
        self
    }

    pub fn lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Issued two hours ago with a one-hour lifetime.
    pub fn expired(mut self) -> Self {
        self.iat = Utc::now().timestamp() - 7200;
        self.lifetime = Duration::from_secs(3600);
        self
    }

    pub fn with_kid(mut self, kid: &str) -> Self {
        self.kid = kid.to_string();
        self
    }

    /// Sign with cached test key `index`.
    pub fn signed_with(mut self, index: usize) -> Self {
        self.key_index = index;
        self
    }

    pub fn claims(&self) -> TokenClaims {
        TokenClaims::new(self.sub.clone(), self.token_class, self.iat, self.lifetime)
    }

    /// Sign the token.
    pub fn build(self) -> String {
        sign_token(&self.kid, test_rsa_key(self.key_index), &self.claims())
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}
