//! Remote token authentication over HTTP.

use common::error::{TrustError, EXPIRED_TOKEN_REASON, INVALID_TOKEN_REASON};
use common::issuer_client::{HttpIssuerClient, IssuerClient, DEFAULT_HTTP_TIMEOUT};
use common::secret::{ExposeSecret, SecretString};
use common::types::{TokenClass, TokenVerdict};
use security_test_utils::{test_identity, TestSecurityServer, TestSeed, TestTokenBuilder};
use serde_json::json;

struct Setup {
    server: TestSecurityServer,
    client: HttpIssuerClient,
    bearer: SecretString,
}

async fn setup() -> Result<Setup, anyhow::Error> {
    let identity = test_identity("gateway");
    let server = TestSecurityServer::spawn(
        TestSeed::new()
            .with_user("alice@bank.test", "pw-alice")
            .with_registered_component(&identity)
            .with_registered_component(&test_identity("ledger")),
    )
    .await?;
    let client = HttpIssuerClient::new(server.url(), DEFAULT_HTTP_TIMEOUT)?;
    let bearer = client
        .authenticate(&identity.id, &identity.secret, TokenClass::Component)
        .await?
        .token;
    Ok(Setup {
        server,
        client,
        bearer,
    })
}

#[tokio::test]
async fn test_valid_token_is_authenticated() -> Result<(), anyhow::Error> {
    let s = setup().await?;
    let ledger = test_identity("ledger");
    let inspected = s
        .client
        .authenticate(&ledger.id, &ledger.secret, TokenClass::Component)
        .await?;

    let verdict = s
        .client
        .authenticate_token(&s.bearer, inspected.token.expose_secret(), "/api/accounts")
        .await?;

    match verdict {
        TokenVerdict::Authenticated(subject) => {
            assert_eq!(subject.subject, "ledger");
            assert_eq!(subject.token_class, TokenClass::Component);
        }
        TokenVerdict::Rejected { reason } => panic!("unexpected rejection: {reason}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_expired_inspected_token_is_rejected_with_reason() -> Result<(), anyhow::Error> {
    let s = setup().await?;
    let expired = s
        .server
        .keys()
        .mint_at("ledger", TokenClass::Component, 1_000_000_000)
        .unwrap();

    let verdict = s
        .client
        .authenticate_token(&s.bearer, &expired.token, "/api/accounts")
        .await?;

    assert_eq!(
        verdict,
        TokenVerdict::Rejected {
            reason: EXPIRED_TOKEN_REASON.to_string()
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_foreign_signature_is_rejected_opaquely() -> Result<(), anyhow::Error> {
    let s = setup().await?;
    let forged = TestTokenBuilder::new()
        .for_subject("ledger")
        .with_kid(&s.server.keys().active_kid(TokenClass::Component))
        .signed_with(3)
        .build();

    let verdict = s
        .client
        .authenticate_token(&s.bearer, &forged, "/api/accounts")
        .await?;

    assert_eq!(
        verdict,
        TokenVerdict::Rejected {
            reason: INVALID_TOKEN_REASON.to_string()
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_missing_bearer_is_401() -> Result<(), anyhow::Error> {
    let s = setup().await?;

    let response = reqwest::Client::new()
        .post(format!("{}/api/v1/auth/token/authenticate", s.server.url()))
        .json(&json!({"token": "x", "request_path": "/api/x"}))
        .send()
        .await?;

    assert_eq!(response.status(), 401);
    assert!(response.headers().contains_key("www-authenticate"));
    Ok(())
}

#[tokio::test]
async fn test_expired_bearer_is_401_with_expiry_reason() -> Result<(), anyhow::Error> {
    let s = setup().await?;
    let expired_bearer = s
        .server
        .keys()
        .mint_at("gateway", TokenClass::Component, 1_000_000_000)
        .unwrap();

    let err = s
        .client
        .authenticate_token(
            &SecretString::from(expired_bearer.token),
            "irrelevant",
            "/api/x",
        )
        .await
        .unwrap_err();

    assert!(err.is_expiry(), "caller must be told its own token expired: {err}");
    Ok(())
}

#[tokio::test]
async fn test_user_bearer_is_forbidden() -> Result<(), anyhow::Error> {
    let s = setup().await?;
    let user_token = s
        .client
        .authenticate(
            "alice@bank.test",
            &SecretString::from("pw-alice"),
            TokenClass::User,
        )
        .await?
        .token;

    let err = s
        .client
        .authenticate_token(&user_token, "irrelevant", "/api/x")
        .await
        .unwrap_err();

    assert!(matches!(err, TrustError::Forbidden(_)));
    Ok(())
}
