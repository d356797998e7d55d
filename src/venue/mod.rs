//! Venue adapters: pull markets from one venue, normalize to the internal
//! schema, enforce per-venue rate limits, and report health. See spec.md
//! §4.1.

pub mod rate_limit;
pub mod venue_a;
pub mod venue_b;

use crate::types::NormalizedMarket;
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketStatus {
    Open,
    Closed,
    Any,
}

impl Default for MarketStatus {
    fn default() -> Self {
        MarketStatus::Open
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    pub status: MarketStatus,
    pub limit: usize,
    pub max_pages: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self { status: MarketStatus::Open, limit: 100, max_pages: 2 }
    }
}

/// Errors an adapter surfaces to its caller (the Poller or Aggregator).
/// `Auth` is distinct and non-retriable, per spec.md §4.1.
#[derive(Debug, thiserror::Error)]
pub enum VenueError {
    #[error("fetch failed after retries: {0}")]
    Fetch(String),
    #[error("authentication failed: {0}")]
    Auth(String),
}

/// Per-venue health is tracked centrally in `Cache` (spec.md §4.5: "Venue
/// health state lives in Cache"), written by the Aggregator on fetch and
/// the Poller on each tick — adapters themselves stay stateless aside
/// from their rate limiter.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    fn venue(&self) -> crate::types::Venue;

    async fn fetch_markets(&self, options: FetchOptions) -> Result<Vec<NormalizedMarket>, VenueError>;
}

/// Retries `f` with exponential backoff `2^attempt` seconds, up to
/// `max_attempts` tries. `f` returning an `Auth` error aborts retries
/// immediately since auth failures are never transient.
pub async fn retry_with_backoff<F, Fut, T>(max_attempts: u32, mut f: F) -> Result<T, VenueError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, VenueError>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(VenueError::Auth(msg)) => return Err(VenueError::Auth(msg)),
            Err(e) => {
                attempt += 1;
                if attempt >= max_attempts {
                    return Err(e);
                }
                let backoff = Duration::from_secs(2u64.pow(attempt));
                tokio::time::sleep(backoff).await;
            }
        }
    }
}
