//! Component registry over HTTP.

use common::error::TrustError;
use common::issuer_client::{HttpIssuerClient, IssuerClient, DEFAULT_HTTP_TIMEOUT};
use common::secret::SecretString;
use common::types::{ComponentIdentity, TokenClass};
use security_test_utils::{test_identity, TestSecurityServer, TestSeed};
use serde_json::json;

async fn server_with(identities: &[&ComponentIdentity]) -> Result<TestSecurityServer, anyhow::Error> {
    let seed = identities
        .iter()
        .fold(TestSeed::new(), |seed, identity| seed.with_component(identity));
    TestSecurityServer::spawn(seed).await
}

#[tokio::test]
async fn test_register_returns_201_then_409() -> Result<(), anyhow::Error> {
    let identity = test_identity("c1");
    let server = server_with(&[&identity]).await?;
    let http = reqwest::Client::new();
    let body = json!({
        "component_id": "c1",
        "component_name": "c1-name",
        "component_secret": "c1-secret",
        "component_url": "http://c1:8080"
    });

    let first = http
        .post(format!("{}/api/v1/components/register", server.url()))
        .json(&body)
        .send()
        .await?;
    assert_eq!(first.status(), 201);

    let second = http
        .post(format!("{}/api/v1/components/register", server.url()))
        .json(&body)
        .send()
        .await?;
    assert_eq!(second.status(), 409);
    let error: serde_json::Value = second.json().await?;
    assert_eq!(error["error"]["code"], "ALREADY_REGISTERED");
    Ok(())
}

#[tokio::test]
async fn test_register_errors_map_to_trust_errors() -> Result<(), anyhow::Error> {
    let identity = test_identity("c1");
    let server = server_with(&[&identity]).await?;
    let client = HttpIssuerClient::new(server.url(), DEFAULT_HTTP_TIMEOUT)?;

    let wrong_secret = ComponentIdentity {
        secret: SecretString::from("guess"),
        ..identity.clone()
    };
    assert_eq!(
        client.register(&wrong_secret).await.unwrap_err(),
        TrustError::InvalidCredentials
    );

    let unlisted = test_identity("c9");
    assert!(matches!(
        client.register(&unlisted).await.unwrap_err(),
        TrustError::NotFound(_)
    ));

    client.register(&identity).await?;
    assert!(matches!(
        client.register(&identity).await.unwrap_err(),
        TrustError::AlreadyRegistered(_)
    ));
    Ok(())
}

#[tokio::test]
async fn test_deregister_requires_own_token() -> Result<(), anyhow::Error> {
    let c1 = test_identity("c1");
    let c2 = test_identity("c2");
    let server = server_with(&[&c1, &c2]).await?;
    let client = HttpIssuerClient::new(server.url(), DEFAULT_HTTP_TIMEOUT)?;

    client.register(&c1).await?;
    client.register(&c2).await?;
    let c2_token = client
        .authenticate(&c2.id, &c2.secret, TokenClass::Component)
        .await?
        .token;

    let err = client.deregister(&c2_token, "c1").await.unwrap_err();
    assert!(matches!(err, TrustError::Forbidden(_)));
    assert_eq!(server.stores().components.registered_count(), 2);

    client.deregister(&c2_token, "c2").await?;
    assert_eq!(server.stores().components.registered_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_deregister_returns_204_and_token_stops_working() -> Result<(), anyhow::Error> {
    let identity = test_identity("c1");
    let server = server_with(&[&identity]).await?;
    let client = HttpIssuerClient::new(server.url(), DEFAULT_HTTP_TIMEOUT)?;
    client.register(&identity).await?;
    let token = client
        .authenticate(&identity.id, &identity.secret, TokenClass::Component)
        .await?
        .token;

    let response = reqwest::Client::new()
        .delete(format!("{}/api/v1/components/c1", server.url()))
        .bearer_auth(common::secret::ExposeSecret::expose_secret(&token))
        .send()
        .await?;
    assert_eq!(response.status(), 204);

    // The subject no longer exists, so its token is refused
    let err = client.deregister(&token, "c1").await.unwrap_err();
    assert!(matches!(err, TrustError::AuthenticationFailed(_)));
    Ok(())
}

#[tokio::test]
async fn test_deregister_without_token_is_401() -> Result<(), anyhow::Error> {
    let server = server_with(&[]).await?;

    let response = reqwest::Client::new()
        .delete(format!("{}/api/v1/components/c1", server.url()))
        .send()
        .await?;

    assert_eq!(response.status(), 401);
    Ok(())
}
