//! Common data types for bank-trust components.
//!
//! Includes the request/response bodies exchanged with the
//! Security-Component so both sides deserialize the same shapes.

use crate::secret::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether a token represents a human user or a machine component.
///
/// Each class is signed with its own key pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenClass {
    User,
    Component,
}

impl TokenClass {
    /// Both classes, in a stable order.
    pub const ALL: [TokenClass; 2] = [TokenClass::User, TokenClass::Component];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TokenClass::User => "user",
            TokenClass::Component => "component",
        }
    }
}

impl fmt::Display for TokenClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(TokenClass::User),
            "component" => Ok(TokenClass::Component),
            other => Err(format!("unknown token class '{other}'")),
        }
    }
}

/// Identity established for a request once its token has been verified.
///
/// The subject is redacted in Debug output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedSubject {
    pub subject: String,
    pub token_class: TokenClass,
}

impl fmt::Debug for AuthenticatedSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatedSubject")
            .field("subject", &"[REDACTED]")
            .field("token_class", &self.token_class)
            .finish()
    }
}

/// A component's own identity, loaded from local configuration at startup.
#[derive(Debug, Clone)]
pub struct ComponentIdentity {
    /// Opaque component id (UUID-like).
    pub id: String,
    /// Human-readable name, must match the registry allow-list.
    pub name: String,
    /// Network address the component serves on.
    pub url: String,
    /// Shared secret used both to register and to authenticate.
    pub secret: SecretString,
}

// =============================================================================
// Wire Types
// =============================================================================

/// `POST /api/v1/auth/token` request body.
#[derive(Debug, Deserialize)]
pub struct AuthenticateRequest {
    /// Email or user id for users, component id for components.
    pub principal: String,
    pub credentials: SecretString,
    pub token_class: TokenClass,
}

/// Successful token response.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// `POST /api/v1/auth/token/authenticate` request body.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenAuthenticateRequest {
    pub token: String,
    pub request_path: String,
}

impl fmt::Debug for TokenAuthenticateRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAuthenticateRequest")
            .field("token", &"[REDACTED]")
            .field("request_path", &self.request_path)
            .finish()
    }
}

/// Outcome of remote token authentication.
///
/// A rejected token is a normal answer from the issuer, not a failed call:
/// the caller's own bearer token was accepted, the inspected one was not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TokenVerdict {
    Authenticated(AuthenticatedSubject),
    Rejected { reason: String },
}

/// `POST /api/v1/components/register` request body.
#[derive(Debug, Deserialize)]
pub struct RegistrationRequest {
    pub component_id: String,
    pub component_name: String,
    pub component_secret: SecretString,
    pub component_url: String,
}
