//! The published key-set document (JWKS-shaped).
//!
//! ```json
//! {"keys":[{"kty":"RSA","kid":"user-20260101-1","alg":"RS256","use":"sig","n":"...","e":"AQAB"}]}
//! ```
//!
//! `n` and `e` are the big-endian modulus and exponent, base64url without
//! padding, so any verifier can rebuild the RSA public key from them.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::DecodingKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors turning a published entry into a usable verification key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeySetError {
    #[error("unsupported key type '{0}'")]
    UnsupportedKeyType(String),

    #[error("unsupported algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    #[error("invalid RSA components: {0}")]
    InvalidComponents(String),
}

/// Published collection of current public keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySet {
    pub keys: Vec<JsonWebKey>,
}

impl KeySet {
    /// Entry for `kid`, if published.
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<&JsonWebKey> {
        self.keys.iter().find(|k| k.kid == kid)
    }

    /// Published key ids, in document order.
    #[must_use]
    pub fn kids(&self) -> Vec<&str> {
        self.keys.iter().map(|k| k.kid.as_str()).collect()
    }
}

/// One RSA public key in the key set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKey {
    /// Key type (always "RSA").
    pub kty: String,

    /// Key ID, matched against the token header.
    pub kid: String,

    /// Algorithm (always "RS256").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    /// Key use (always "sig").
    #[serde(default, rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,

    /// Modulus, base64url.
    pub n: String,

    /// Public exponent, base64url.
    pub e: String,
}

impl JsonWebKey {
    /// Build an entry from raw big-endian modulus and exponent bytes.
    #[must_use]
    pub fn rsa(kid: impl Into<String>, modulus_be: &[u8], exponent_be: &[u8]) -> Self {
        Self {
            kty: "RSA".to_string(),
            kid: kid.into(),
            alg: Some("RS256".to_string()),
            key_use: Some("sig".to_string()),
            n: URL_SAFE_NO_PAD.encode(modulus_be),
            e: URL_SAFE_NO_PAD.encode(exponent_be),
        }
    }

    /// Rebuild the verification key from modulus and exponent.
    ///
    /// # Errors
    ///
    /// Fails for non-RSA entries, algorithms other than RS256, or
    /// components that are not valid base64url.
    pub fn decoding_key(&self) -> Result<DecodingKey, KeySetError> {
        if self.kty != "RSA" {
            return Err(KeySetError::UnsupportedKeyType(self.kty.clone()));
        }
        if let Some(alg) = self.alg.as_deref() {
            if alg != "RS256" {
                return Err(KeySetError::UnsupportedAlgorithm(alg.to_string()));
            }
        }
        if self.n.is_empty() || self.e.is_empty() {
            return Err(KeySetError::InvalidComponents(
                "empty modulus or exponent".to_string(),
            ));
        }
        DecodingKey::from_rsa_components(&self.n, &self.e)
            .map_err(|e| KeySetError::InvalidComponents(e.to_string()))
    }
}
