//! Handler functions for the six read-only endpoints in spec.md §6. Every
//! response is wrapped with `{timestamp, fetch_time_ms}` by `Envelope`.

use crate::error::AppError;
use crate::types::{Category, HealthStatus, UnifiedMarket};
use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Instant;

use super::AppState;

#[derive(Serialize)]
struct Envelope<T: Serialize> {
    #[serde(flatten)]
    body: T,
    timestamp: i64,
    fetch_time_ms: u64,
}

fn wrap<T: Serialize>(body: T, start: Instant) -> Json<Value> {
    let envelope = Envelope { body, timestamp: Utc::now().timestamp(), fetch_time_ms: start.elapsed().as_millis() as u64 };
    Json(serde_json::to_value(envelope).expect("envelope serializes"))
}

/// `GET /api/unified-markets/{category}`. Unknown categories (not a valid
/// `Category` string) return a 200 empty list, per spec.md §6 — 400 is
/// reserved for genuinely malformed input (empty path segment).
pub async fn unified_markets(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> Result<Json<Value>, AppError> {
    let start = Instant::now();

    if category.trim().is_empty() {
        return Err(AppError::Validation("category must not be empty".to_string()));
    }

    let filter = if category.eq_ignore_ascii_case("all") {
        None
    } else {
        match Category::from_str_loose(&category) {
            Some(c) => Some(c),
            None => {
                let empty: Vec<UnifiedMarket> = Vec::new();
                let dist = UnifiedMarket::platform_distribution(&empty);
                return Ok(wrap(json!({ "category": category, "count": 0, "markets": empty, "platform_distribution": dist }), start));
            }
        }
    };

    let markets = state.aggregator.get_unified_markets(filter, state.fetch_options()).await?;
    let dist = UnifiedMarket::platform_distribution(&markets);

    Ok(wrap(
        json!({ "category": category, "count": markets.len(), "markets": markets, "platform_distribution": dist }),
        start,
    ))
}

/// `GET /api/unified-market/{unified_id}`.
pub async fn unified_market(
    State(state): State<AppState>,
    Path(unified_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let start = Instant::now();
    let market = state.aggregator.get_unified_market(&unified_id, state.fetch_options()).await?;
    Ok(wrap(json!({ "market": market }), start))
}

/// `GET /api/arbitrage-opportunities`.
pub async fn arbitrage_opportunities(State(state): State<AppState>) -> Json<Value> {
    let start = Instant::now();
    let clusters = state.aggregator.find_arbitrage_opportunities().await;
    let opportunities: Vec<Value> = clusters
        .iter()
        .map(|um| {
            let op = um.arbitrage.as_ref().expect("filtered to arbitrage.exists");
            json!({ "unified_id": um.unified_id, "question": um.canonical_question, "opportunity": op })
        })
        .collect();
    wrap(json!({ "count": opportunities.len(), "opportunities": opportunities }), start)
}

/// `GET /api/platform-health`.
pub async fn platform_health(State(state): State<AppState>) -> Json<Value> {
    let start = Instant::now();
    let mut platforms = HashMap::new();
    for (venue, health) in state.cache.all_health() {
        platforms.insert(
            venue.tag(),
            json!({
                "status": health.status,
                "last_success": health.last_success,
                "last_error": health.last_error,
                "last_attempt": health.last_attempt,
                "degraded_since": if health.status == HealthStatus::Degraded { health.last_attempt } else { None },
            }),
        );
    }
    wrap(json!({ "platforms": platforms }), start)
}

/// `GET /api/polling-stats`.
pub async fn polling_stats(State(state): State<AppState>) -> Json<Value> {
    let start = Instant::now();
    let mut by_venue = HashMap::new();
    for venue in crate::types::Venue::all() {
        if let Some(stats) = state.poller.stats(venue).await {
            let success_rate = if stats.total_ticks > 0 { stats.successes as f64 / stats.total_ticks as f64 } else { 0.0 };
            by_venue.insert(
                venue.tag(),
                json!({
                    "total": stats.total_ticks,
                    "success": stats.successes,
                    "fail": stats.failures,
                    "success_rate": success_rate,
                    "last_fetch": state.poller.last_fetch(venue),
                    "is_stale": state.poller.is_stale(venue),
                    "last_error": stats.last_error,
                }),
            );
        }
    }
    wrap(json!(by_venue), start)
}

/// `GET /api/staleness-status`.
pub async fn staleness_status(State(state): State<AppState>) -> Json<Value> {
    let start = Instant::now();
    let mut by_venue = HashMap::new();
    for venue in crate::types::Venue::all() {
        let is_stale = state.poller.is_stale(venue);
        let last_fetch = state.poller.last_fetch(venue);
        let time_since_ms = last_fetch.map(|t| (Utc::now() - t).num_milliseconds().max(0));
        by_venue.insert(venue.tag(), json!({ "is_stale": is_stale, "last_fetch": last_fetch, "time_since_last_fetch_ms": time_since_ms }));
    }
    wrap(json!(by_venue), start)
}
