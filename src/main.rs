//! Wrapper Exchange - reserve-backed 1:1 token exchange service
//!
//! Holds a reserve of one anchor asset and exchanges it on demand, 1:1,
//! for any other registered fungible asset (and back again).

use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

mod api;
mod asset;
mod config;
mod error;
mod events;
mod exchange;
mod metrics;

use asset::AssetRegistry;
use config::Settings;
use exchange::ExchangeLedger;
use metrics::MetricsServer;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting Wrapper Exchange v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "Loaded configuration: anchor asset {}, {} assets",
        settings.exchange.anchor_asset,
        settings.assets.len()
    );

    // Event channel shared by the registry, the exchange and the logger
    let (event_tx, event_rx) = tokio::sync::broadcast::channel(10000);

    // Initialize asset ledgers
    let registry = Arc::new(AssetRegistry::from_settings(&settings, event_tx.clone()).await?);
    info!("Asset ledgers initialized");

    // Bind the exchange to its anchor
    let exchange = Arc::new(ExchangeLedger::new(
        registry.clone(),
        &settings.exchange.anchor_asset,
        &settings.exchange.account,
        event_tx,
    )?);
    info!(
        "Exchange ledger bound to anchor {} as account {}",
        exchange.anchor(),
        exchange.account()
    );

    // Initialize metrics server
    let metrics_server = if settings.metrics.enabled {
        Some(MetricsServer::new(settings.metrics.port))
    } else {
        None
    };

    // Start event logger
    let event_handle = tokio::spawn(events::run_logger(event_rx));

    // Start API server
    let api_handle = tokio::spawn({
        let api_config = settings.api.clone();
        let exchange = exchange.clone();
        let registry = registry.clone();
        async move {
            if let Err(e) = api::run_server(api_config, exchange, registry).await {
                error!("API server error: {}", e);
            }
        }
    });

    // Start metrics server
    let metrics_handle = if let Some(server) = metrics_server {
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    // Start reserve sampler
    let sampler_handle = tokio::spawn({
        let registry = registry.clone();
        let account = settings.exchange.account.clone();
        let interval = settings.exchange.reserve_sample_interval_secs;
        async move {
            registry.start_reserve_sampler(&account, interval).await;
        }
    });

    // Health check loop
    let health_handle = tokio::spawn({
        let exchange = exchange.clone();
        async move {
            loop {
                tokio::time::sleep(tokio::time::Duration::from_secs(30)).await;

                match exchange.reserves(exchange.anchor()).await {
                    Ok(_) => metrics::record_health_check(),
                    Err(e) => {
                        warn!("Anchor reserve check failed: {}", e);
                        metrics::record_health_check_failure();
                    }
                }
            }
        }
    });

    info!("Wrapper Exchange is running");
    info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    // Graceful shutdown
    registry.stop().await;

    // Abort background tasks
    api_handle.abort();
    event_handle.abort();
    sampler_handle.abort();
    health_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("Wrapper Exchange stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,wrapper_exchange=debug,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
