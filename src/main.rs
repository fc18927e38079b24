use settlement_backend::app::{build_router, Services, Stores};
use settlement_backend::config::AppConfig;
use settlement_backend::database::init_pool_from_config;
use settlement_backend::health::HealthChecker;
use settlement_backend::logging::init_tracing;
use settlement_backend::payments::providers::{WorldpayConfig, WorldpayLookupClient};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(&config.logging);
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        acquirer_environment = ?config.acquirer.environment,
        acquirer_base_url = %config.acquirer.base_url,
        provider_id = config.acquirer.provider_id,
        "Starting settlement backend"
    );

    if config.webhook.allowed_ips.is_empty() {
        warn!("WEBHOOK_ALLOWED_IPS is empty, every webhook will be rejected");
    }

    let (stores, db_pool) = match &config.database {
        Some(database) => {
            let pool = init_pool_from_config(database).await.map_err(|e| {
                error!("Failed to initialize database pool: {}", e);
                e
            })?;
            info!(
                max_connections = pool.options().get_max_connections(),
                "Database connection pool initialized"
            );
            (Stores::postgres(pool.clone()), Some(pool))
        }
        None => {
            info!("Skipping database initialization (SKIP_EXTERNALS=true), using in-memory stores");
            (Stores::memory(), None)
        }
    };

    let lookup = Arc::new(WorldpayLookupClient::new(WorldpayConfig::from(&config.acquirer))?);
    let services = Services::build(&config, &stores, lookup);
    let app = build_router(&config, &services, HealthChecker::new(db_pool));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!(address = %addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server shut down");
    Ok(())
}
