//! Security-Component
//!
//! Token issuer, key-set publisher and component registry for the bank's
//! inter-component trust layer.

use security_service::config::Config;
use security_service::crypto::{KeyManager, KeyManagerConfig};
use security_service::errors::SecurityError;
use security_service::observability::metrics::init_metrics_recorder;
use security_service::repositories::{
    ComponentRepository, InMemoryComponentRepository, InMemoryUserRepository, SeedData,
    UserRepository,
};
use security_service::routes::{self, AppState};
use security_service::services::{Issuer, Registry};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "security_service=debug,common=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Security-Component");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        token_lifetime_seconds = config.token_lifetime.as_secs(),
        rotation_grace_seconds = config.rotation_grace.as_secs(),
        bcrypt_cost = config.bcrypt_cost,
        admin_components = config.admin_component_ids.len(),
        "Configuration loaded successfully"
    );

    let seed = match &config.seed_file {
        Some(path) => SeedData::load(path).map_err(|e| {
            error!("Failed to load seed data: {}", e);
            e
        })?,
        None => {
            warn!("SECURITY_SEED_FILE not set, starting with empty credential stores");
            SeedData::default()
        }
    };

    // bcrypt hashing of seed secrets, RSA key generation and the dummy hash
    // are all CPU-bound
    let bcrypt_cost = config.bcrypt_cost;
    let key_config = KeyManagerConfig {
        token_lifetime: config.token_lifetime,
        rotation_grace: config.rotation_grace,
        clock_skew: config.jwt_clock_skew,
    };
    let (issuer, registry) = tokio::task::spawn_blocking(move || {
        let (users, allow_list) = seed.into_records(bcrypt_cost)?;
        info!(
            users = users.len(),
            allow_listed_components = allow_list.len(),
            "Credential stores initialized"
        );
        let users: Arc<dyn UserRepository> = Arc::new(InMemoryUserRepository::with_users(users));
        let components: Arc<dyn ComponentRepository> =
            Arc::new(InMemoryComponentRepository::new(allow_list));

        let keys = Arc::new(KeyManager::generate(key_config)?);
        let issuer = Issuer::new(keys, users, components.clone(), bcrypt_cost)?;
        Ok::<_, SecurityError>((Arc::new(issuer), Arc::new(Registry::new(components))))
    })
    .await?
    .map_err(|e| {
        error!("Failed to initialize issuer: {}", e);
        e
    })?;

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    let bind_address = config.bind_address.clone();
    let state = Arc::new(AppState {
        issuer,
        registry,
        config,
    });

    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Security-Component listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Security-Component shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
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
}
