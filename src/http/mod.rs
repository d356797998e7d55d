//! HTTP server plumbing: router assembly and shared application state.
//! Grounded on the teacher's `axum` + `tower_http` stack in `main.rs`.

pub mod handlers;

use crate::aggregator::Aggregator;
use crate::cache::Cache;
use crate::config::Config;
use crate::poller::Poller;
use crate::venue::FetchOptions;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub aggregator: Aggregator,
    pub cache: Arc<Cache>,
    pub poller: Arc<Poller>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions { max_pages: self.config.fetch_strategy.max_pages(), ..Default::default() }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/unified-markets/:category", get(handlers::unified_markets))
        .route("/api/unified-market/:unified_id", get(handlers::unified_market))
        .route("/api/arbitrage-opportunities", get(handlers::arbitrage_opportunities))
        .route("/api/platform-health", get(handlers::platform_health))
        .route("/api/polling-stats", get(handlers::polling_stats))
        .route("/api/staleness-status", get(handlers::staleness_status))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
