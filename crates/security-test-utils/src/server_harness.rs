//! Test server harness for E2E testing
//!
//! Provides `TestSecurityServer` for spawning real Security-Component
//! routers in tests.

use crate::fixtures::{TestIssuer, TestSeed, TestStores};
use metrics_exporter_prometheus::PrometheusBuilder;
use security_service::config::Config;
use security_service::crypto::{KeyManager, KeyManagerConfig};
use security_service::routes::{self, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Test harness for spawning the Security-Component in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health() -> Result<(), anyhow::Error> {
///     let server = TestSecurityServer::spawn(TestSeed::new()).await?;
///     let response = reqwest::get(format!("{}/health", server.url())).await?;
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestSecurityServer {
    addr: SocketAddr,
    issuer: TestIssuer,
    config: Config,
    _handle: JoinHandle<()>,
}

impl TestSecurityServer {
    /// Spawn a server over `seed` with default key settings.
    pub async fn spawn(seed: TestSeed) -> Result<Self, anyhow::Error> {
        Self::spawn_with(seed, KeyManagerConfig::default(), Vec::new()).await
    }

    /// Spawn a server with explicit key settings and admin component ids.
    ///
    /// The server binds `127.0.0.1:0` and runs in a background task that is
    /// aborted on drop.
    pub async fn spawn_with(
        seed: TestSeed,
        key_config: KeyManagerConfig,
        admin_component_ids: Vec<String>,
    ) -> Result<Self, anyhow::Error> {
        let issuer = TestIssuer::with_config(&seed, key_config).await;

        let config = Config {
            bind_address: "127.0.0.1:0".to_string(),
            token_lifetime: key_config.token_lifetime,
            rotation_grace: key_config.rotation_grace,
            jwt_clock_skew: key_config.clock_skew,
            admin_component_ids,
            ..Config::default()
        };

        let state = Arc::new(AppState {
            issuer: issuer.issuer.clone(),
            registry: issuer.registry.clone(),
            config: config.clone(),
        });

        // A handle without a global recorder; /metrics renders empty
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();
        let app = routes::build_routes(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            issuer,
            config,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The signing keys behind the server.
    pub fn keys(&self) -> &Arc<KeyManager> {
        &self.issuer.keys
    }

    /// The Issuer and Registry behind the server.
    pub fn issuer(&self) -> &TestIssuer {
        &self.issuer
    }

    pub fn stores(&self) -> &TestStores {
        &self.issuer.stores
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for TestSecurityServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
