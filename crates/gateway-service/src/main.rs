//! Gateway
//!
//! Front door of the bank platform: registers with the Security-Component,
//! authenticates every request under the protected prefix and deregisters
//! on shutdown.

use common::bootstrap::bootstrap;
use common::circuit_breaker::{CircuitBreaker, GuardedIssuerClient};
use common::issuer_client::{HttpIssuerClient, IssuerClient, DEFAULT_HTTP_TIMEOUT};
use common::key_set_cache::{IssuerKeySetSource, KeySetCache, KeySetCacheConfig, KeySetSource};
use common::token_manager::exit_on_identity_loss;
use common::verifier::TokenVerifier;
use gateway_service::config::{Config, VerificationMode};
use gateway_service::middleware::{AuthState, Verification};
use gateway_service::observability::metrics::init_metrics_recorder;
use gateway_service::routes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gateway_service=debug,common=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Gateway");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        issuer_url = %config.issuer_url,
        verification_mode = config.verification_mode.as_str(),
        protected_prefix = %config.protected_prefix,
        component_id = %config.identity.id,
        "Configuration loaded successfully"
    );

    let http_client = HttpIssuerClient::new(config.issuer_url.clone(), DEFAULT_HTTP_TIMEOUT)?;
    let issuer: Arc<dyn IssuerClient> = Arc::new(GuardedIssuerClient::new(
        Arc::new(http_client),
        CircuitBreaker::new(config.circuit_breaker),
    ));

    let cache = match config.verification_mode {
        VerificationMode::Local => Some(Arc::new(KeySetCache::with_config(
            Arc::new(IssuerKeySetSource(issuer.clone())) as Arc<dyn KeySetSource>,
            KeySetCacheConfig {
                refresh_interval: config.key_set_refresh_interval,
                ..KeySetCacheConfig::default()
            },
        ))),
        VerificationMode::Remote => None,
    };

    // Startup failures are fatal; the orchestrator restarts the process
    let registration = bootstrap(
        issuer.clone(),
        &config.identity,
        cache.as_deref(),
        exit_on_identity_loss(),
    )
    .await
    .map_err(|e| {
        error!("Failed to register with the Security-Component: {}", e);
        e
    })?;

    let cancel_token = CancellationToken::new();
    let (verification, refresh_task) = match cache {
        Some(cache) => {
            let task = cache.spawn_refresh_task(cancel_token.child_token());
            (Verification::Local(Arc::new(TokenVerifier::new(cache))), Some(task))
        }
        None => (
            Verification::Remote {
                issuer: issuer.clone(),
                tokens: registration.tokens().clone(),
                timeout: config.remote_verify_timeout,
            },
            None,
        ),
    };

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    let auth = Arc::new(AuthState {
        protected_prefix: config.protected_prefix.clone(),
        verification,
    });
    let app = routes::build_routes(auth, metrics_handle);

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(config.shutdown_drain))
    .await?;

    cancel_token.cancel();
    if let Some(task) = refresh_task {
        if let Err(e) = task.await {
            warn!("Key set refresh task ended abnormally: {}", e);
        }
    }

    registration.deregister().await;

    info!("Gateway shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and the drain period is complete.
async fn shutdown_signal(drain: Duration) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    if drain.is_zero() {
        info!("Skipping drain period (SHUTDOWN_DRAIN_SECONDS=0)");
    } else {
        warn!("Draining connections for {} seconds...", drain.as_secs());
        tokio::time::sleep(drain).await;
        info!("Drain period complete");
    }
}
