//! Client abstraction over the Security-Component.
//!
//! [`IssuerClient`] is the one seam every caller of the issuer goes
//! through. Production code uses [`HttpIssuerClient`], usually wrapped in
//! [`GuardedIssuerClient`](crate::circuit_breaker::GuardedIssuerClient);
//! tests substitute in-memory implementations.

use crate::error::{ErrorResponse, TrustError};
use crate::key_set::KeySet;
use crate::secret::{ExposeSecret, SecretString};
use crate::types::{ComponentIdentity, TokenClass, TokenResponse, TokenVerdict};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, instrument, trace, warn};

/// Token issuance endpoint.
pub const AUTHENTICATE_PATH: &str = "/api/v1/auth/token";

/// Key-set document endpoint.
pub const KEY_SET_PATH: &str = "/.well-known/jwks.json";

/// Remote token verification endpoint.
pub const TOKEN_AUTHENTICATE_PATH: &str = "/api/v1/auth/token/authenticate";

/// Component registration endpoint.
pub const REGISTER_PATH: &str = "/api/v1/components/register";

/// Prefix for per-component registry resources.
pub const COMPONENTS_PATH: &str = "/api/v1/components";

/// Default HTTP request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connection timeout for HTTP client.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A token handed out by the issuer.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: SecretString,
    pub expires_in: u64,
}

/// Operations the trust layer needs from the Security-Component.
#[async_trait]
pub trait IssuerClient: Send + Sync {
    /// Exchange credentials for a token of the given class.
    async fn authenticate(
        &self,
        principal: &str,
        credentials: &SecretString,
        token_class: TokenClass,
    ) -> Result<IssuedToken, TrustError>;

    /// Fetch the published key set.
    async fn key_set(&self) -> Result<KeySet, TrustError>;

    /// Ask the issuer to verify `token` on behalf of the caller.
    ///
    /// `bearer` is the caller's own component token. `Err` means the call
    /// itself failed; a rejected `token` comes back as
    /// [`TokenVerdict::Rejected`].
    async fn authenticate_token(
        &self,
        bearer: &SecretString,
        token: &str,
        request_path: &str,
    ) -> Result<TokenVerdict, TrustError>;

    /// Register this component's identity.
    async fn register(&self, identity: &ComponentIdentity) -> Result<(), TrustError>;

    /// Remove a registration. `bearer` must be the component's own token.
    async fn deregister(&self, bearer: &SecretString, component_id: &str)
        -> Result<(), TrustError>;
}

// =============================================================================
// HTTP Implementation
// =============================================================================

/// [`IssuerClient`] speaking JSON over HTTP.
#[derive(Clone)]
pub struct HttpIssuerClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for HttpIssuerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpIssuerClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpIssuerClient {
    /// Create a client for the issuer at `base_url` (no trailing slash).
    ///
    /// # Errors
    ///
    /// Returns `TrustError::Configuration` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TrustError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| TrustError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl IssuerClient for HttpIssuerClient {
    #[instrument(skip_all, fields(token_class = %token_class))]
    async fn authenticate(
        &self,
        principal: &str,
        credentials: &SecretString,
        token_class: TokenClass,
    ) -> Result<IssuedToken, TrustError> {
        let body = serde_json::json!({
            "principal": principal,
            "credentials": credentials.expose_secret(),
            "token_class": token_class,
        });

        let response = self
            .http_client
            .post(self.url(AUTHENTICATE_PATH))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let token: TokenResponse = parse_success(response).await?;
        debug!(
            target: "common.issuer_client",
            expires_in_secs = token.expires_in,
            "Token acquired"
        );

        Ok(IssuedToken {
            token: SecretString::from(token.access_token),
            expires_in: token.expires_in,
        })
    }

    #[instrument(skip_all)]
    async fn key_set(&self) -> Result<KeySet, TrustError> {
        let response = self
            .http_client
            .get(self.url(KEY_SET_PATH))
            .send()
            .await
            .map_err(transport_error)?;

        parse_success(response).await
    }

    #[instrument(skip_all, fields(request_path = %request_path))]
    async fn authenticate_token(
        &self,
        bearer: &SecretString,
        token: &str,
        request_path: &str,
    ) -> Result<TokenVerdict, TrustError> {
        let body = serde_json::json!({
            "token": token,
            "request_path": request_path,
        });

        let response = self
            .http_client
            .post(self.url(TOKEN_AUTHENTICATE_PATH))
            .bearer_auth(bearer.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        parse_success(response).await
    }

    #[instrument(skip_all, fields(component_id = %identity.id))]
    async fn register(&self, identity: &ComponentIdentity) -> Result<(), TrustError> {
        let body = serde_json::json!({
            "component_id": identity.id,
            "component_name": identity.name,
            "component_secret": identity.secret.expose_secret(),
            "component_url": identity.url,
        });

        let response = self
            .http_client
            .post(self.url(REGISTER_PATH))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        expect_success(response).await
    }

    #[instrument(skip_all, fields(component_id = %component_id))]
    async fn deregister(
        &self,
        bearer: &SecretString,
        component_id: &str,
    ) -> Result<(), TrustError> {
        let response = self
            .http_client
            .delete(self.url(&format!("{COMPONENTS_PATH}/{component_id}")))
            .bearer_auth(bearer.expose_secret())
            .send()
            .await
            .map_err(transport_error)?;

        expect_success(response).await
    }
}

fn transport_error(err: reqwest::Error) -> TrustError {
    debug!(target: "common.issuer_client", error = %err, "HTTP request failed");
    TrustError::ServiceUnreachable(err.to_string())
}

async fn parse_success<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, TrustError> {
    if !response.status().is_success() {
        return Err(error_from_response(response).await);
    }
    response.json().await.map_err(|e| {
        warn!(target: "common.issuer_client", error = %e, "Failed to parse issuer response");
        TrustError::Internal(format!("Invalid issuer response: {e}"))
    })
}

async fn expect_success(response: reqwest::Response) -> Result<(), TrustError> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(error_from_response(response).await)
    }
}

/// Rebuild a [`TrustError`] from a non-success issuer response.
async fn error_from_response(response: reqwest::Response) -> TrustError {
    let status = response.status();
    let body = response.text().await.unwrap_or_else(|e| {
        trace!(target: "common.issuer_client", error = %e, "Failed to read error response body");
        String::new()
    });
    trace!(target: "common.issuer_client", status = %status, body = %body, "Issuer error response");

    let detail = serde_json::from_str::<ErrorResponse>(&body)
        .ok()
        .map(|r| r.error);
    let message = detail
        .as_ref()
        .map_or_else(|| format!("Status {status}"), |d| d.message.clone());
    let code = detail.as_ref().map(|d| d.code.as_str());

    let err = error_from_status(status, code, message);
    debug!(target: "common.issuer_client", status = %status, error = %err, "Issuer rejected request");
    err
}

fn error_from_status(status: StatusCode, code: Option<&str>, message: String) -> TrustError {
    match status {
        StatusCode::UNAUTHORIZED if code == Some("INVALID_CREDENTIALS") => {
            TrustError::InvalidCredentials
        }
        StatusCode::UNAUTHORIZED => TrustError::AuthenticationFailed(message),
        StatusCode::FORBIDDEN => TrustError::Forbidden(message),
        StatusCode::NOT_FOUND => TrustError::NotFound(message),
        StatusCode::CONFLICT => TrustError::AlreadyRegistered(message),
        StatusCode::TOO_MANY_REQUESTS => TrustError::ServiceUnreachable(message),
        s if s.is_server_error() => {
            TrustError::ServiceUnreachable(format!("Issuer server error: {s}"))
        }
        s => TrustError::Internal(format!("Unexpected issuer status: {s}")),
    }
}
