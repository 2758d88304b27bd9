//! Token issuance over HTTP.

use common::issuer_client::{HttpIssuerClient, IssuerClient, DEFAULT_HTTP_TIMEOUT};
use common::key_set_cache::{IssuerKeySetSource, KeySetCache, KeySetSource};
use common::secret::ExposeSecret;
use common::types::TokenClass;
use common::verifier::TokenVerifier;
use common::error::TrustError;
use security_test_utils::{test_identity, TestSecurityServer, TestSeed};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_user_token_by_email() -> Result<(), anyhow::Error> {
    let seed = TestSeed::new().with_user("alice@bank.test", "pw-alice");
    let alice = seed.user_id("alice@bank.test");
    let server = TestSecurityServer::spawn(seed).await?;

    let response = reqwest::Client::new()
        .post(format!("{}/api/v1/auth/token", server.url()))
        .json(&json!({
            "principal": "alice@bank.test",
            "credentials": "pw-alice",
            "token_class": "user"
        }))
        .send()
        .await?;

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 36_000);

    let token = body["access_token"].as_str().unwrap_or_default();
    let claims = server.keys().verify(token).map_err(|e| anyhow::anyhow!("{e}"))?;
    assert_eq!(Some(claims.sub), alice.map(|id| id.to_string()));
    assert_eq!(claims.token_class, TokenClass::User);
    Ok(())
}

#[tokio::test]
async fn test_invalid_credentials_are_opaque() -> Result<(), anyhow::Error> {
    let server = TestSecurityServer::spawn(
        TestSeed::new().with_user("alice@bank.test", "pw-alice"),
    )
    .await?;
    let client = reqwest::Client::new();

    let mut bodies = Vec::new();
    for principal in ["alice@bank.test", "nobody@bank.test"] {
        let response = client
            .post(format!("{}/api/v1/auth/token", server.url()))
            .json(&json!({
                "principal": principal,
                "credentials": "wrong",
                "token_class": "user"
            }))
            .send()
            .await?;

        assert_eq!(response.status(), 401);
        assert_eq!(
            response
                .headers()
                .get("www-authenticate")
                .and_then(|v| v.to_str().ok()),
            Some("Bearer realm=\"bank-trust\"")
        );
        bodies.push(response.json::<serde_json::Value>().await?);
    }

    let first = bodies.first().cloned().unwrap_or_default();
    assert_eq!(first["error"]["code"], "INVALID_CREDENTIALS");
    assert_eq!(bodies.get(1), Some(&first), "unknown and wrong secret look identical");
    Ok(())
}

#[tokio::test]
async fn test_unregistered_component_cannot_authenticate() -> Result<(), anyhow::Error> {
    let identity = test_identity("c1");
    let server = TestSecurityServer::spawn(TestSeed::new().with_component(&identity)).await?;
    let client = HttpIssuerClient::new(server.url(), DEFAULT_HTTP_TIMEOUT)?;

    let err = client
        .authenticate(&identity.id, &identity.secret, TokenClass::Component)
        .await
        .unwrap_err();
    assert_eq!(err, TrustError::InvalidCredentials);
    Ok(())
}

#[tokio::test]
async fn test_component_token_verifies_through_remote_key_set() -> Result<(), anyhow::Error> {
    let identity = test_identity("c1");
    let server =
        TestSecurityServer::spawn(TestSeed::new().with_registered_component(&identity)).await?;
    let client: Arc<dyn IssuerClient> =
        Arc::new(HttpIssuerClient::new(server.url(), DEFAULT_HTTP_TIMEOUT)?);

    let issued = client
        .authenticate(&identity.id, &identity.secret, TokenClass::Component)
        .await?;

    let cache = Arc::new(KeySetCache::new(
        Arc::new(IssuerKeySetSource(client.clone())) as Arc<dyn KeySetSource>
    ));
    let verifier = TokenVerifier::new(cache);
    let verified = verifier
        .verify(issued.token.expose_secret())
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    assert_eq!(verified.subject, "c1");
    assert_eq!(verified.token_class, TokenClass::Component);
    Ok(())
}

#[tokio::test]
async fn test_malformed_body_is_rejected() -> Result<(), anyhow::Error> {
    let server = TestSecurityServer::spawn(TestSeed::new()).await?;

    let response = reqwest::Client::new()
        .post(format!("{}/api/v1/auth/token", server.url()))
        .json(&json!({"principal": "x", "credentials": "y", "token_class": "admin"}))
        .send()
        .await?;

    assert!(response.status().is_client_error());
    Ok(())
}
