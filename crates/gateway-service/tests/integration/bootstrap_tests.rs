//! Gateway startup registration against a live Security-Component.

use common::bootstrap::bootstrap;
use common::error::TrustError;
use common::issuer_client::{HttpIssuerClient, IssuerClient, DEFAULT_HTTP_TIMEOUT};
use common::key_set_cache::{IssuerKeySetSource, KeySetCache, KeySetSource};
use common::secret::{ExposeSecret, SecretString};
use common::token_manager::log_identity_loss;
use common::types::ComponentIdentity;
use security_service::repositories::ComponentRepository;
use security_test_utils::{test_identity, TestSecurityServer, TestSeed};
use std::sync::Arc;

fn client(server: &TestSecurityServer) -> Result<Arc<dyn IssuerClient>, anyhow::Error> {
    Ok(Arc::new(HttpIssuerClient::new(
        server.url(),
        DEFAULT_HTTP_TIMEOUT,
    )?))
}

#[tokio::test]
async fn test_bootstrap_registers_and_warms_cache() -> Result<(), anyhow::Error> {
    let identity = test_identity("gateway");
    let server = TestSecurityServer::spawn(TestSeed::new().with_component(&identity)).await?;
    let issuer = client(&server)?;
    let cache = KeySetCache::new(
        Arc::new(IssuerKeySetSource(issuer.clone())) as Arc<dyn KeySetSource>
    );

    let registration = bootstrap(issuer.clone(), &identity, Some(&cache), log_identity_loss())
        .await?;

    assert_eq!(registration.component_id(), "gateway");
    assert_eq!(cache.kids().await.len(), 2);
    assert!(server
        .stores()
        .components
        .registered("gateway")
        .await?
        .is_some());

    // After deregistration the same identity can register again
    registration.deregister().await;
    let again = bootstrap(issuer, &identity, None, log_identity_loss()).await?;
    again.deregister().await;
    Ok(())
}

/// A gateway that exited without deregistering (identity loss, crash)
/// restarts cleanly: bootstrap reclaims the registration it left behind.
#[tokio::test]
async fn test_restarted_instance_reclaims_registration() -> Result<(), anyhow::Error> {
    let identity = test_identity("gateway");
    let server = TestSecurityServer::spawn(TestSeed::new().with_component(&identity)).await?;
    let issuer = client(&server)?;

    let first = bootstrap(issuer.clone(), &identity, None, log_identity_loss()).await?;
    let first_token = first.tokens().current_token();
    drop(first);

    let restarted = bootstrap(issuer, &identity, None, log_identity_loss()).await?;

    assert_eq!(restarted.component_id(), "gateway");
    assert_ne!(
        restarted.tokens().current_token().expose_secret(),
        first_token.expose_secret()
    );
    assert_eq!(server.stores().components.registered_count(), 1);
    restarted.deregister().await;
    assert_eq!(server.stores().components.registered_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_bootstrap_failures_are_specific() -> Result<(), anyhow::Error> {
    let identity = test_identity("gateway");
    let server = TestSecurityServer::spawn(TestSeed::new().with_component(&identity)).await?;
    let issuer = client(&server)?;

    let wrong_secret = ComponentIdentity {
        secret: SecretString::from("not-the-secret"),
        ..identity.clone()
    };
    let err = bootstrap(issuer.clone(), &wrong_secret, None, log_identity_loss())
        .await
        .unwrap_err();
    assert_eq!(err, TrustError::InvalidCredentials);

    let stranger = test_identity("stranger");
    let err = bootstrap(issuer, &stranger, None, log_identity_loss())
        .await
        .unwrap_err();
    assert!(matches!(err, TrustError::NotFound(_)));
    Ok(())
}

#[tokio::test]
async fn test_unreachable_issuer_is_fatal() -> Result<(), anyhow::Error> {
    // Nothing listens on port 9 of localhost
    let issuer: Arc<dyn IssuerClient> = Arc::new(HttpIssuerClient::new(
        "http://127.0.0.1:9",
        DEFAULT_HTTP_TIMEOUT,
    )?);

    let err = bootstrap(issuer, &test_identity("gateway"), None, log_identity_loss())
        .await
        .unwrap_err();

    assert!(err.is_transport());
    Ok(())
}
