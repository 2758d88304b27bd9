//! Health, metrics and key-set endpoint tests.

use security_test_utils::{TestSecurityServer, TestSeed};

#[tokio::test]
async fn test_health_endpoint_returns_ok() -> Result<(), anyhow::Error> {
    let server = TestSecurityServer::spawn(TestSeed::new()).await?;

    let response = reqwest::get(format!("{}/health", server.url())).await?;

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await?, "OK");
    Ok(())
}

#[tokio::test]
async fn test_metrics_endpoint_is_public() -> Result<(), anyhow::Error> {
    let server = TestSecurityServer::spawn(TestSeed::new()).await?;

    let response = reqwest::get(format!("{}/metrics", server.url())).await?;

    assert_eq!(response.status(), 200);
    Ok(())
}

#[tokio::test]
async fn test_key_set_document_shape() -> Result<(), anyhow::Error> {
    let server = TestSecurityServer::spawn(TestSeed::new()).await?;

    let response = reqwest::get(format!("{}/.well-known/jwks.json", server.url())).await?;

    assert_eq!(response.status(), 200);
    assert_eq!(
        response
            .headers()
            .get("cache-control")
            .and_then(|v| v.to_str().ok()),
        Some("max-age=300")
    );

    let body: serde_json::Value = response.json().await?;
    let keys = body["keys"].as_array().cloned().unwrap_or_default();
    assert_eq!(keys.len(), 2, "one key per token class");
    for key in &keys {
        assert_eq!(key["kty"], "RSA");
        assert_eq!(key["alg"], "RS256");
        assert_eq!(key["use"], "sig");
        assert!(key["n"].as_str().is_some_and(|n| !n.is_empty()));
        assert_eq!(key["e"], "AQAB");
    }
    Ok(())
}

#[tokio::test]
async fn test_unknown_route_returns_404() -> Result<(), anyhow::Error> {
    let server = TestSecurityServer::spawn(TestSeed::new()).await?;

    let response = reqwest::get(format!("{}/api/v1/nonexistent", server.url())).await?;

    assert_eq!(response.status(), 404);
    Ok(())
}
