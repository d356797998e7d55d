//! Venue-B adapter. Modeled on the teacher's Kalshi client: an
//! order-book-style venue reporting yes/no bid prices directly rather than
//! a token list, with an optional bearer token for authenticated quota.

use super::{retry_with_backoff, rate_limit::VenueRateLimiter, FetchOptions, MarketStatus, VenueAdapter, VenueError};
use crate::types::{Category, NormalizedMarket, Outcome, Venue};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_BASE_URL: &str = "https://venue-b.example.com/markets";
const PER_MINUTE_QUOTA: u32 = 50;
const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Deserialize)]
struct RawMarket {
    ticker: String,
    title: Option<String>,
    close_time: Option<String>,
    status: String,
    #[serde(default)]
    volume_24h: f64,
    #[serde(default)]
    open_interest: f64,
    #[serde(default)]
    category: Option<String>,
    /// cents, 0-100
    yes_bid: Option<f64>,
    /// cents, 0-100
    no_bid: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawPage {
    markets: Option<Vec<RawMarket>>,
}

pub struct VenueBAdapter {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    rate_limiter: VenueRateLimiter,
}

impl VenueBAdapter {
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL.to_string(), api_key)
    }

    pub fn with_base_url(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: Client::builder().timeout(Duration::from_secs(30)).build().expect("client"),
            base_url,
            api_key,
            rate_limiter: VenueRateLimiter::new(PER_MINUTE_QUOTA),
        }
    }

    async fn fetch_page(&self, status: MarketStatus, limit: usize, cursor: usize) -> Result<Vec<RawMarket>, VenueError> {
        let status_param = match status {
            MarketStatus::Open => "status=open",
            MarketStatus::Closed => "status=closed",
            MarketStatus::Any => "status=unopened,open,closed,settled",
        };
        let url = format!("{}?limit={}&cursor={}&{}", self.base_url, limit, cursor * limit, status_param);

        retry_with_backoff(MAX_ATTEMPTS, || {
            let client = self.client.clone();
            let url = url.clone();
            let api_key = self.api_key.clone();
            async move {
                let mut req = client.get(&url);
                if let Some(key) = api_key.as_ref() {
                    req = req.bearer_auth(key);
                }
                let resp = req.send().await.map_err(|e| VenueError::Fetch(e.to_string()))?;
                if resp.status() == reqwest::StatusCode::UNAUTHORIZED || resp.status() == reqwest::StatusCode::FORBIDDEN {
                    return Err(VenueError::Auth("venue-b rejected credentials".to_string()));
                }
                if !resp.status().is_success() {
                    return Err(VenueError::Fetch(format!("http {}", resp.status())));
                }
                let page: RawPage = resp.json().await.map_err(|e| VenueError::Fetch(e.to_string()))?;
                Ok(page.markets.unwrap_or_default())
            }
        })
        .await
    }

    /// Normalizes one raw record. `yes_bid`/`no_bid` are cents (0-100);
    /// a record missing its title or both bids is dropped.
    pub fn normalize(raw: &RawMarket) -> Option<NormalizedMarket> {
        let title = raw.title.as_ref().filter(|t| !t.trim().is_empty())?;

        let yes = raw.yes_bid.map(|c| (c / 100.0).clamp(0.0, 1.0));
        let no = raw.no_bid.map(|c| (c / 100.0).clamp(0.0, 1.0));

        let outcomes = match (yes, no) {
            (Some(y), Some(n)) => vec![
                Outcome { name: "Yes".to_string(), price: y, rank: 0, image: None },
                Outcome { name: "No".to_string(), price: n, rank: 1, image: None },
            ],
            (Some(y), None) => vec![
                Outcome { name: "Yes".to_string(), price: y, rank: 0, image: None },
                Outcome { name: "No".to_string(), price: (1.0 - y).clamp(0.0, 1.0), rank: 1, image: None },
            ],
            (None, Some(n)) => vec![
                Outcome { name: "Yes".to_string(), price: (1.0 - n).clamp(0.0, 1.0), rank: 0, image: None },
                Outcome { name: "No".to_string(), price: n, rank: 1, image: None },
            ],
            (None, None) => return None,
        };

        let close_time = raw
            .close_time
            .as_ref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        let category = raw
            .category
            .as_deref()
            .and_then(Category::from_str_loose)
            .unwrap_or_else(|| Category::from_question_keywords(title));

        let spread = NormalizedMarket::compute_spread(&outcomes);
        let closed = matches!(raw.status.as_str(), "closed" | "settled" | "finalized");
        let resolved = raw.status == "settled" || raw.status == "finalized";

        Some(NormalizedMarket {
            id: format!("venue_b:{}", raw.ticker),
            venue: Venue::VenueB,
            question: title.clone(),
            outcomes,
            volume_24h: raw.volume_24h.max(0.0),
            liquidity: raw.open_interest.max(0.0),
            spread,
            end_date: close_time,
            category,
            closed,
            resolved,
            last_update: Utc::now(),
        })
    }
}

#[async_trait]
impl VenueAdapter for VenueBAdapter {
    fn venue(&self) -> Venue {
        Venue::VenueB
    }

    async fn fetch_markets(&self, options: FetchOptions) -> Result<Vec<NormalizedMarket>, VenueError> {
        let mut out = Vec::new();
        for cursor in 0..options.max_pages {
            self.rate_limiter.acquire().await;
            debug!(cursor, "fetching venue-b page");

            let raws = self.fetch_page(options.status, options.limit, cursor).await?;

            let page_len = raws.len();
            for raw in &raws {
                match Self::normalize(raw) {
                    Some(m) => out.push(m),
                    None => debug!(ticker = %raw.ticker, "normalization skipped record"),
                }
            }

            if page_len < options.limit {
                break;
            }
        }

        info!(count = out.len(), "fetched venue-b markets");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_raw(title: &str, yes_bid: Option<f64>, no_bid: Option<f64>) -> RawMarket {
        RawMarket {
            ticker: "PRES-24".to_string(),
            title: Some(title.to_string()),
            close_time: Some("2024-11-06T00:00:00Z".to_string()),
            status: "open".to_string(),
            volume_24h: 900.0,
            open_interest: 4000.0,
            category: None,
            yes_bid,
            no_bid,
        }
    }

    #[test]
    fn normalizes_both_sided_market() {
        let raw = sample_raw("Will Trump win the election?", Some(53.0), Some(45.0));
        let m = VenueBAdapter::normalize(&raw).unwrap();
        assert_eq!(m.venue, Venue::VenueB);
        assert!((m.yes_outcome().unwrap().price - 0.53).abs() < 1e-9);
    }

    #[test]
    fn derives_no_side_from_yes_when_missing() {
        let raw = sample_raw("Will X happen?", Some(0.6 * 100.0), None);
        let m = VenueBAdapter::normalize(&raw).unwrap();
        assert!((m.no_outcome().unwrap().price - 0.4).abs() < 1e-9);
    }

    #[test]
    fn drops_when_both_bids_missing() {
        let raw = sample_raw("Will X happen?", None, None);
        assert!(VenueBAdapter::normalize(&raw).is_none());
    }

    #[test]
    fn drops_empty_title() {
        let raw = sample_raw("", Some(50.0), Some(50.0));
        assert!(VenueBAdapter::normalize(&raw).is_none());
    }

    #[test]
    fn settled_status_marks_resolved_and_closed() {
        let mut raw = sample_raw("Will X happen?", Some(100.0), Some(0.0));
        raw.status = "settled".to_string();
        let m = VenueBAdapter::normalize(&raw).unwrap();
        assert!(m.closed);
        assert!(m.resolved);
    }
}
