//! Remote verification through the Security-Component's token-authenticate
//! endpoint.

use crate::{body_json, gateway_router, get_request};
use axum::http::StatusCode;
use chrono::Utc;
use common::error::{TrustError, EXPIRED_TOKEN_REASON};
use common::issuer_client::{
    HttpIssuerClient, IssuerClient, DEFAULT_HTTP_TIMEOUT, TOKEN_AUTHENTICATE_PATH,
};
use common::secret::{ExposeSecret, SecretString};
use common::token_manager::{log_identity_loss, OutboundTokenManager};
use common::types::{AuthenticatedSubject, TokenClass, TokenVerdict};
use gateway_service::middleware::auth::VERIFICATION_UNAVAILABLE_REASON;
use gateway_service::middleware::{AuthState, Verification};
use security_test_utils::{
    test_identity, MockIssuerClient, TestIssuer, TestSecurityServer, TestSeed,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ALICE: &str = "alice@bank.test";
const ALICE_PASSWORD: &str = "correct horse";

/// Remote-mode auth state for the registered `gateway` component.
async fn remote_auth(
    issuer: Arc<dyn IssuerClient>,
    timeout: Duration,
) -> Result<AuthState, anyhow::Error> {
    let tokens =
        OutboundTokenManager::start(issuer.clone(), &test_identity("gateway"), log_identity_loss())
            .await?;
    Ok(AuthState {
        protected_prefix: "/api/".to_string(),
        verification: Verification::Remote {
            issuer,
            tokens,
            timeout,
        },
    })
}

async fn spawn_server() -> Result<(TestSecurityServer, String), anyhow::Error> {
    let seed = TestSeed::new()
        .with_user(ALICE, ALICE_PASSWORD)
        .with_registered_component(&test_identity("gateway"));
    let alice_id = seed.user_id(ALICE).unwrap().to_string();
    Ok((TestSecurityServer::spawn(seed).await?, alice_id))
}

#[tokio::test]
async fn test_remote_valid_token_reaches_handler() -> Result<(), anyhow::Error> {
    let (server, alice_id) = spawn_server().await?;
    let issuer: Arc<dyn IssuerClient> =
        Arc::new(HttpIssuerClient::new(server.url(), DEFAULT_HTTP_TIMEOUT)?);
    let (router, downstream_calls) =
        gateway_router(remote_auth(issuer.clone(), Duration::from_secs(6)).await?);

    let token = issuer
        .authenticate(ALICE, &SecretString::from(ALICE_PASSWORD), TokenClass::User)
        .await?
        .token;

    let response = router
        .clone()
        .oneshot(get_request("/api/x", Some(token.expose_secret())))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(downstream_calls.load(Ordering::SeqCst), 1);

    let response = router
        .oneshot(get_request("/api/v1/whoami", Some(token.expose_secret())))
        .await?;
    let body = body_json(response).await;
    assert_eq!(body["subject"], alice_id);
    assert_eq!(body["token_class"], "user");
    Ok(())
}

/// An expired user token on `/api/x` is refused with the reason in the
/// body, and the downstream handler never runs.
#[tokio::test]
async fn test_remote_expired_token_is_401_and_handler_not_invoked() -> Result<(), anyhow::Error> {
    let (server, alice_id) = spawn_server().await?;
    let issuer: Arc<dyn IssuerClient> =
        Arc::new(HttpIssuerClient::new(server.url(), DEFAULT_HTTP_TIMEOUT)?);
    let auth = remote_auth(issuer, Duration::from_secs(6)).await?;
    let tokens = match &auth.verification {
        Verification::Remote { tokens, .. } => tokens.clone(),
        Verification::Local(_) => panic!("remote mode expected"),
    };
    let (router, downstream_calls) = gateway_router(auth);

    let expired = server
        .keys()
        .mint_at(&alice_id, TokenClass::User, Utc::now().timestamp() - 40_000)?;

    let response = router
        .oneshot(get_request("/api/x", Some(&expired.token)))
        .await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key("www-authenticate"));
    let body = body_json(response).await;
    assert_eq!(body["error"]["message"], EXPIRED_TOKEN_REASON);
    assert_eq!(downstream_calls.load(Ordering::SeqCst), 0);
    // The inspected token's expiry is not the gateway's own
    assert_eq!(tokens.reauthentication_count(), 0);
    Ok(())
}

/// Same flow against the Issuer called in-process, without HTTP.
#[tokio::test]
async fn test_remote_mode_against_in_process_issuer() -> Result<(), anyhow::Error> {
    let seed = TestSeed::new()
        .with_user(ALICE, ALICE_PASSWORD)
        .with_registered_component(&test_identity("gateway"));
    let alice_id = seed.user_id(ALICE).unwrap().to_string();
    let test_issuer = TestIssuer::new(&seed).await;
    let issuer: Arc<dyn IssuerClient> = Arc::new(test_issuer.client());
    let (router, downstream_calls) =
        gateway_router(remote_auth(issuer.clone(), Duration::from_secs(6)).await?);

    let token = issuer
        .authenticate(ALICE, &SecretString::from(ALICE_PASSWORD), TokenClass::User)
        .await?
        .token;
    let response = router
        .clone()
        .oneshot(get_request("/api/v1/whoami", Some(token.expose_secret())))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["subject"], alice_id);

    let expired = test_issuer
        .keys
        .mint_at(&alice_id, TokenClass::User, Utc::now().timestamp() - 40_000)?;
    let response = router
        .oneshot(get_request("/api/x", Some(&expired.token)))
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"]["message"], EXPIRED_TOKEN_REASON);
    assert_eq!(downstream_calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_remote_issuer_failure_is_401() -> Result<(), anyhow::Error> {
    let mock = Arc::new(MockIssuerClient::new());
    let (router, downstream_calls) = gateway_router(
        remote_auth(mock.clone() as Arc<dyn IssuerClient>, Duration::from_secs(6)).await?,
    );
    mock.fail_all_with(TrustError::ServiceUnreachable("connection refused".into()));

    let response = router.oneshot(get_request("/api/x", Some("t"))).await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["message"], VERIFICATION_UNAVAILABLE_REASON);
    assert!(!body.to_string().contains("connection refused"));
    assert_eq!(downstream_calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_remote_call_carries_gateway_bearer() -> Result<(), anyhow::Error> {
    let mock = Arc::new(MockIssuerClient::new());
    mock.set_verdict(Ok(TokenVerdict::Authenticated(AuthenticatedSubject {
        subject: "c7".to_string(),
        token_class: TokenClass::Component,
    })));
    let (router, downstream_calls) = gateway_router(
        remote_auth(mock.clone() as Arc<dyn IssuerClient>, Duration::from_secs(6)).await?,
    );

    let response = router.oneshot(get_request("/api/x", Some("inbound"))).await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(downstream_calls.load(Ordering::SeqCst), 1);
    assert_eq!(mock.authenticate_token_calls(), 1);
    // Mock issues token-1 to the gateway at startup
    assert_eq!(mock.last_bearer().as_deref(), Some("token-1"));
    Ok(())
}

#[tokio::test]
async fn test_remote_timeout_is_401() -> Result<(), anyhow::Error> {
    let slow_issuer = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_AUTHENTICATE_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({
                    "result": "authenticated",
                    "subject": "c7",
                    "token_class": "component"
                }))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&slow_issuer)
        .await;

    let issuer: Arc<dyn IssuerClient> =
        Arc::new(HttpIssuerClient::new(slow_issuer.uri(), DEFAULT_HTTP_TIMEOUT)?);
    let tokens = OutboundTokenManager::with_token(
        issuer.clone(),
        &test_identity("gateway"),
        SecretString::from("gateway-token"),
        log_identity_loss(),
    );
    let (router, downstream_calls) = gateway_router(AuthState {
        protected_prefix: "/api/".to_string(),
        verification: Verification::Remote {
            issuer,
            tokens,
            timeout: Duration::from_millis(100),
        },
    });

    let started = std::time::Instant::now();
    let response = router.oneshot(get_request("/api/x", Some("inbound"))).await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(downstream_calls.load(Ordering::SeqCst), 0);
    Ok(())
}
