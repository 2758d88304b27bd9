//! Key rotation through the admin endpoint, seen by a remote verifier.

use common::issuer_client::{HttpIssuerClient, IssuerClient, DEFAULT_HTTP_TIMEOUT};
use common::key_set_cache::{IssuerKeySetSource, KeySetCache, KeySetSource};
use common::secret::{ExposeSecret, SecretString};
use common::types::TokenClass;
use common::verifier::{TokenVerifier, VerifyError};
use security_service::crypto::KeyManagerConfig;
use security_test_utils::{test_identity, TestSecurityServer, TestSeed};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

async fn rotate(
    server: &TestSecurityServer,
    bearer: &SecretString,
    token_class: &str,
) -> Result<reqwest::Response, anyhow::Error> {
    Ok(reqwest::Client::new()
        .post(format!("{}/api/v1/admin/keys/rotate", server.url()))
        .bearer_auth(bearer.expose_secret())
        .json(&json!({ "token_class": token_class }))
        .send()
        .await?)
}

async fn component_token(
    client: &dyn IssuerClient,
    id: &str,
) -> Result<SecretString, anyhow::Error> {
    let identity = test_identity(id);
    Ok(client
        .authenticate(&identity.id, &identity.secret, TokenClass::Component)
        .await?
        .token)
}

#[tokio::test]
async fn test_rotation_keeps_old_key_during_grace() -> Result<(), anyhow::Error> {
    let server = TestSecurityServer::spawn_with(
        TestSeed::new().with_registered_component(&test_identity("ops")),
        KeyManagerConfig::default(),
        vec!["ops".to_string()],
    )
    .await?;
    let client = HttpIssuerClient::new(server.url(), DEFAULT_HTTP_TIMEOUT)?;
    let old_kid = server.keys().active_kid(TokenClass::User);
    let bearer = component_token(&client, "ops").await?;

    let response = rotate(&server, &bearer, "user").await?;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await?;
    let new_kid = body["kid"].as_str().unwrap_or_default().to_string();
    assert!(new_kid.starts_with("user-"));
    assert_ne!(new_kid, old_kid);

    let key_set = client.key_set().await?;
    let kids = key_set.kids();
    assert!(kids.contains(&old_kid.as_str()), "old key stays published");
    assert!(kids.contains(&new_kid.as_str()));
    assert_eq!(kids.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_rotation_requires_admin_component() -> Result<(), anyhow::Error> {
    let server = TestSecurityServer::spawn_with(
        TestSeed::new()
            .with_registered_component(&test_identity("ops"))
            .with_registered_component(&test_identity("ledger")),
        KeyManagerConfig::default(),
        vec!["ops".to_string()],
    )
    .await?;
    let client = HttpIssuerClient::new(server.url(), DEFAULT_HTTP_TIMEOUT)?;
    let bearer = component_token(&client, "ledger").await?;

    let response = rotate(&server, &bearer, "component").await?;

    assert_eq!(response.status(), 403);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["error"]["code"], "FORBIDDEN");
    Ok(())
}

/// A component token verifies; after the component key is rotated with
/// zero grace and the verifier's cache refreshes, the old still-unexpired
/// token fails as an unknown key.
#[tokio::test]
async fn test_zero_grace_rotation_invalidates_old_tokens() -> Result<(), anyhow::Error> {
    let server = TestSecurityServer::spawn_with(
        TestSeed::new()
            .with_registered_component(&test_identity("c1"))
            .with_registered_component(&test_identity("ops")),
        KeyManagerConfig {
            rotation_grace: Duration::ZERO,
            ..KeyManagerConfig::default()
        },
        vec!["ops".to_string()],
    )
    .await?;
    let client: Arc<dyn IssuerClient> =
        Arc::new(HttpIssuerClient::new(server.url(), DEFAULT_HTTP_TIMEOUT)?);
    let cache = Arc::new(KeySetCache::new(
        Arc::new(IssuerKeySetSource(client.clone())) as Arc<dyn KeySetSource>
    ));
    let verifier = TokenVerifier::new(cache.clone());

    let c1_token = component_token(client.as_ref(), "c1").await?;
    let verified = verifier
        .verify(c1_token.expose_secret())
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    assert_eq!(verified.subject, "c1");

    let ops_token = component_token(client.as_ref(), "ops").await?;
    assert_eq!(rotate(&server, &ops_token, "component").await?.status(), 200);
    cache.refresh().await?;

    assert_eq!(
        verifier.verify(c1_token.expose_secret()).await.unwrap_err(),
        VerifyError::UnknownKey
    );

    // A fresh token under the new key verifies
    let fresh = component_token(client.as_ref(), "c1").await?;
    assert!(verifier.verify(fresh.expose_secret()).await.is_ok());
    Ok(())
}
