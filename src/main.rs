//! Cross-venue prediction-market aggregator — binary entrypoint.
//!
//! Wires venue adapters, cache, aggregator, and poller together behind an
//! Axum server. Grounded on the teacher's `main.rs` bootstrap shape
//! (tracing init, config load, router assembly, bind-and-serve).

use anyhow::{Context, Result};
use market_aggregator::aggregator::Aggregator;
use market_aggregator::cache::{spawn_cleanup_task, Cache};
use market_aggregator::config::Config;
use market_aggregator::http::{build_router, AppState};
use market_aggregator::poller::Poller;
use market_aggregator::venue::venue_a::VenueAAdapter;
use market_aggregator::venue::venue_b::VenueBAdapter;
use market_aggregator::venue::VenueAdapter;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("loading configuration")?;
    config.validate().context("validating configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.server.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!(host = %config.server.host, port = config.server.port, "starting market aggregator");

    let venue_a = Arc::new(VenueAAdapter::new());
    let venue_b = Arc::new(VenueBAdapter::new(config.venue_b_api_key.clone()));
    let adapters: Vec<Arc<dyn VenueAdapter>> = vec![venue_a.clone(), venue_b.clone()];

    let cache = Arc::new(Cache::from_config(&config.cache_ttl));
    let aggregator = Aggregator::new(adapters.clone(), cache.clone());

    let poller = Arc::new(Poller::new(
        adapters,
        cache.clone(),
        vec![
            Duration::from_secs(config.poller.venue_a_interval_secs),
            Duration::from_secs(config.poller.venue_b_interval_secs),
        ],
    ));
    poller.start();

    let cleanup_handle = spawn_cleanup_task(cache.clone());

    let state = AppState { aggregator, cache, poller: poller.clone(), config: Arc::new(config.clone()) };
    let app = build_router(state);

    let addr: std::net::SocketAddr =
        format!("{}:{}", config.server.host, config.server.port).parse().context("parsing bind address")?;
    info!(%addr, "listening");

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving")?;

    poller.stop().await;
    cleanup_handle.abort();
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
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

    info!("shutdown signal received");
}
