//! Circuit breaker behaviour on the gateway's remote verification path.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::{middleware, routing::get, Router};
use common::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, GuardedIssuerClient,
};
use common::error::TrustError;
use common::issuer_client::{
    HttpIssuerClient, IssuerClient, DEFAULT_HTTP_TIMEOUT, TOKEN_AUTHENTICATE_PATH,
};
use common::secret::SecretString;
use common::token_manager::{log_identity_loss, OutboundTokenManager};
use common::types::{AuthenticatedSubject, TokenClass, TokenVerdict};
use gateway_service::middleware::{authenticate_request, AuthState, Verification};
use security_test_utils::{test_identity, MockIssuerClient};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FAILURE_THRESHOLD: u32 = 3;

struct Fixture {
    mock: Arc<MockIssuerClient>,
    breaker: CircuitBreaker,
    router: Router,
}

fn breaker(recovery_timeout: Duration) -> CircuitBreaker {
    CircuitBreaker::new(CircuitBreakerConfig {
        failure_threshold: FAILURE_THRESHOLD,
        recovery_timeout,
        half_open_success_threshold: 1,
    })
}

/// Remote-mode router over `transport` guarded by `breaker`.
fn guarded_router(
    transport: Arc<dyn IssuerClient>,
    breaker: &CircuitBreaker,
    remote_timeout: Duration,
) -> Router {
    let issuer: Arc<dyn IssuerClient> =
        Arc::new(GuardedIssuerClient::new(transport, breaker.clone()));
    let tokens = OutboundTokenManager::with_token(
        issuer.clone(),
        &test_identity("gateway"),
        SecretString::from("gateway-token"),
        log_identity_loss(),
    );
    let auth = Arc::new(AuthState {
        protected_prefix: "/api/".to_string(),
        verification: Verification::Remote {
            issuer,
            tokens,
            timeout: remote_timeout,
        },
    });
    Router::new()
        .route("/api/x", get(|| async { "downstream" }))
        .layer(middleware::from_fn_with_state(auth, authenticate_request))
}

fn fixture(recovery_timeout: Duration) -> Fixture {
    let mock = Arc::new(MockIssuerClient::new());
    let breaker = breaker(recovery_timeout);
    let router = guarded_router(
        mock.clone() as Arc<dyn IssuerClient>,
        &breaker,
        Duration::from_secs(6),
    );

    Fixture {
        mock,
        breaker,
        router,
    }
}

async fn call(router: &Router) -> StatusCode {
    let request = Request::builder()
        .uri("/api/x")
        .header("authorization", "Bearer inbound")
        .body(Body::empty())
        .unwrap();
    router.clone().oneshot(request).await.unwrap().status()
}

/// N consecutive transport failures open the breaker; calls in the open
/// window fail without reaching the transport.
#[tokio::test]
async fn test_breaker_opens_after_consecutive_failures() {
    let f = fixture(Duration::from_secs(60));
    f.mock
        .fail_all_with(TrustError::ServiceUnreachable("connection refused".into()));

    for _ in 0..FAILURE_THRESHOLD {
        assert_eq!(call(&f.router).await, StatusCode::UNAUTHORIZED);
    }
    assert_eq!(f.mock.authenticate_token_calls(), FAILURE_THRESHOLD);
    assert!(matches!(f.breaker.state(), CircuitState::Open { .. }));

    for _ in 0..5 {
        assert_eq!(call(&f.router).await, StatusCode::UNAUTHORIZED);
    }
    assert_eq!(
        f.mock.authenticate_token_calls(),
        FAILURE_THRESHOLD,
        "open breaker must not touch the transport"
    );
    assert_eq!(f.mock.total_calls(), FAILURE_THRESHOLD);
    assert_eq!(f.breaker.fast_fail_count(), 5);
}

#[tokio::test]
async fn test_rejected_tokens_do_not_trip_breaker() {
    let f = fixture(Duration::from_secs(60));

    // The default mock verdict rejects every inspected token
    for _ in 0..(FAILURE_THRESHOLD * 2) {
        assert_eq!(call(&f.router).await, StatusCode::UNAUTHORIZED);
    }

    assert_eq!(f.breaker.state(), CircuitState::Closed);
    assert_eq!(f.mock.authenticate_token_calls(), FAILURE_THRESHOLD * 2);
}

#[tokio::test]
async fn test_half_open_probe_closes_breaker() {
    let f = fixture(Duration::from_millis(50));
    f.mock
        .fail_all_with(TrustError::ServiceUnreachable("connection refused".into()));
    for _ in 0..FAILURE_THRESHOLD {
        call(&f.router).await;
    }
    assert!(matches!(f.breaker.state(), CircuitState::Open { .. }));

    // Issuer recovers while the breaker is still open
    f.mock.clear_failure();
    f.mock.set_verdict(Ok(TokenVerdict::Authenticated(AuthenticatedSubject {
        subject: "c7".to_string(),
        token_class: TokenClass::Component,
    })));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(call(&f.router).await, StatusCode::OK);
    assert_eq!(f.breaker.state(), CircuitState::Closed);
    assert_eq!(f.mock.authenticate_token_calls(), FAILURE_THRESHOLD + 1);
}

/// An issuer that accepts connections but never answers: each request hits
/// the remote-verification timeout, and those timeouts open the breaker so
/// later requests stop waiting on the hung issuer.
#[tokio::test]
async fn test_hung_issuer_timeouts_open_breaker() {
    let hung_issuer = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_AUTHENTICATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&hung_issuer)
        .await;

    let transport: Arc<dyn IssuerClient> =
        Arc::new(HttpIssuerClient::new(hung_issuer.uri(), DEFAULT_HTTP_TIMEOUT).unwrap());
    let breaker = breaker(Duration::from_secs(60));
    let router = guarded_router(transport, &breaker, Duration::from_millis(100));

    for _ in 0..FAILURE_THRESHOLD {
        assert_eq!(call(&router).await, StatusCode::UNAUTHORIZED);
    }
    assert!(
        matches!(breaker.state(), CircuitState::Open { .. }),
        "timeouts must count as breaker failures"
    );

    let started = std::time::Instant::now();
    for _ in 0..6 {
        assert_eq!(call(&router).await, StatusCode::UNAUTHORIZED);
    }
    assert!(
        started.elapsed() < Duration::from_millis(300),
        "open breaker answers without waiting on the issuer"
    );
    assert_eq!(breaker.fast_fail_count(), 6);

    let transport_hits = hung_issuer.received_requests().await.unwrap_or_default().len();
    assert!(transport_hits <= FAILURE_THRESHOLD as usize);
}
