//! Local verification against a live Security-Component's key set.

use crate::{body_json, gateway_router, get_request};
use axum::http::StatusCode;
use chrono::Utc;
use common::error::{TrustError, EXPIRED_TOKEN_REASON, INVALID_TOKEN_REASON};
use common::issuer_client::{HttpIssuerClient, IssuerClient, DEFAULT_HTTP_TIMEOUT};
use common::key_set_cache::{IssuerKeySetSource, KeySetCache, KeySetSource};
use common::secret::{ExposeSecret, SecretString};
use common::testing::StaticKeySetSource;
use common::types::TokenClass;
use common::verifier::TokenVerifier;
use gateway_service::errors::BEARER_CHALLENGE;
use gateway_service::middleware::{AuthState, Verification};
use security_test_utils::{TestSecurityServer, TestSeed, TestTokenBuilder};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tower::ServiceExt;

const ALICE: &str = "alice@bank.test";
const ALICE_PASSWORD: &str = "correct horse";

fn local_auth(server: &TestSecurityServer) -> Result<AuthState, anyhow::Error> {
    let client: Arc<dyn IssuerClient> =
        Arc::new(HttpIssuerClient::new(server.url(), DEFAULT_HTTP_TIMEOUT)?);
    let cache = Arc::new(KeySetCache::new(
        Arc::new(IssuerKeySetSource(client)) as Arc<dyn KeySetSource>
    ));
    Ok(AuthState {
        protected_prefix: "/api/".to_string(),
        verification: Verification::Local(Arc::new(TokenVerifier::new(cache))),
    })
}

async fn user_token(server: &TestSecurityServer) -> Result<SecretString, anyhow::Error> {
    let client = HttpIssuerClient::new(server.url(), DEFAULT_HTTP_TIMEOUT)?;
    Ok(client
        .authenticate(ALICE, &SecretString::from(ALICE_PASSWORD), TokenClass::User)
        .await?
        .token)
}

#[tokio::test]
async fn test_valid_user_token_reaches_handler_with_identity() -> Result<(), anyhow::Error> {
    let seed = TestSeed::new().with_user(ALICE, ALICE_PASSWORD);
    let alice_id = seed.user_id(ALICE).unwrap();
    let server = TestSecurityServer::spawn(seed).await?;
    let (router, downstream_calls) = gateway_router(local_auth(&server)?);
    let token = user_token(&server).await?;

    let response = router
        .clone()
        .oneshot(get_request("/api/v1/whoami", Some(token.expose_secret())))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["subject"], alice_id.to_string());
    assert_eq!(body["token_class"], "user");

    let response = router
        .oneshot(get_request("/api/x", Some(token.expose_secret())))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(downstream_calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_missing_token_is_401_with_challenge() -> Result<(), anyhow::Error> {
    let server = TestSecurityServer::spawn(TestSeed::new()).await?;
    let (router, downstream_calls) = gateway_router(local_auth(&server)?);

    let response = router.oneshot(get_request("/api/x", None)).await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get("www-authenticate").unwrap(),
        BEARER_CHALLENGE
    );
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "AUTHENTICATION_FAILED");
    assert_eq!(downstream_calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_unprotected_paths_pass_through() -> Result<(), anyhow::Error> {
    let server = TestSecurityServer::spawn(TestSeed::new()).await?;
    let (router, _) = gateway_router(local_auth(&server)?);

    let response = router.oneshot(get_request("/health", None)).await?;

    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_expired_token_is_rejected_with_expiry_reason() -> Result<(), anyhow::Error> {
    let seed = TestSeed::new().with_user(ALICE, ALICE_PASSWORD);
    let alice_id = seed.user_id(ALICE).unwrap().to_string();
    let server = TestSecurityServer::spawn(seed).await?;
    let (router, downstream_calls) = gateway_router(local_auth(&server)?);

    // Signed by the live user key, issued well over one lifetime ago
    let expired = server
        .keys()
        .mint_at(&alice_id, TokenClass::User, Utc::now().timestamp() - 40_000)?;

    let response = router
        .oneshot(get_request("/api/x", Some(&expired.token)))
        .await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["message"], EXPIRED_TOKEN_REASON);
    assert_eq!(downstream_calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_token_from_unknown_key_is_rejected() -> Result<(), anyhow::Error> {
    let server = TestSecurityServer::spawn(TestSeed::new()).await?;
    let (router, _) = gateway_router(local_auth(&server)?);
    let forged = TestTokenBuilder::new()
        .for_subject("c1")
        .with_kid("component-forged-1")
        .signed_with(3)
        .build();

    let response = router.oneshot(get_request("/api/x", Some(&forged))).await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["message"], INVALID_TOKEN_REASON);
    Ok(())
}

#[tokio::test]
async fn test_unavailable_key_set_is_503() -> Result<(), anyhow::Error> {
    let source = Arc::new(StaticKeySetSource::failing(TrustError::ServiceUnreachable(
        "down".into(),
    )));
    let cache = Arc::new(KeySetCache::new(source as Arc<dyn KeySetSource>));
    let (router, downstream_calls) = gateway_router(AuthState {
        protected_prefix: "/api/".to_string(),
        verification: Verification::Local(Arc::new(TokenVerifier::new(cache))),
    });
    let token = TestTokenBuilder::new().build();

    let response = router.oneshot(get_request("/api/x", Some(&token))).await?;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(downstream_calls.load(Ordering::SeqCst), 0);
    Ok(())
}
