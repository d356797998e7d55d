//! Venue-A adapter. Modeled on the teacher's Polymarket client: a CLOB-style
//! venue whose markets carry a set of priced tokens and a boolean
//! active/closed/archived lifecycle.

use super::{retry_with_backoff, rate_limit::VenueRateLimiter, FetchOptions, MarketStatus, VenueAdapter, VenueError};
use crate::types::{Category, NormalizedMarket, Outcome, Venue};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_BASE_URL: &str = "https://venue-a.example.com/markets";
const PER_MINUTE_QUOTA: u32 = 100;
const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Deserialize)]
struct RawToken {
    outcome: String,
    price: f64,
}

#[derive(Debug, Deserialize)]
struct RawMarket {
    condition_id: String,
    question: Option<String>,
    end_date_iso: Option<String>,
    active: bool,
    closed: bool,
    #[serde(default)]
    archived: bool,
    #[serde(default)]
    volume_24h: f64,
    #[serde(default)]
    liquidity: f64,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    tokens: Vec<RawToken>,
}

#[derive(Debug, Deserialize)]
struct RawPage {
    data: Option<Vec<RawMarket>>,
}

pub struct VenueAAdapter {
    client: Client,
    base_url: String,
    rate_limiter: VenueRateLimiter,
}

impl VenueAAdapter {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(base_url: String) -> Self {
        Self {
            client: Client::builder().timeout(Duration::from_secs(30)).build().expect("client"),
            base_url,
            rate_limiter: VenueRateLimiter::new(PER_MINUTE_QUOTA),
        }
    }

    async fn fetch_page(&self, status: MarketStatus, limit: usize, page: usize) -> Result<Vec<RawMarket>, VenueError> {
        let status_param = match status {
            MarketStatus::Open => "active=true",
            MarketStatus::Closed => "active=false",
            MarketStatus::Any => "",
        };
        let url = format!("{}?limit={}&offset={}&{}", self.base_url, limit, page * limit, status_param);

        retry_with_backoff(MAX_ATTEMPTS, || {
            let client = self.client.clone();
            let url = url.clone();
            async move {
                let resp = client.get(&url).send().await.map_err(|e| VenueError::Fetch(e.to_string()))?;
                if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
                    return Err(VenueError::Auth("venue-a rejected credentials".to_string()));
                }
                if !resp.status().is_success() {
                    return Err(VenueError::Fetch(format!("http {}", resp.status())));
                }
                let page: RawPage = resp.json().await.map_err(|e| VenueError::Fetch(e.to_string()))?;
                Ok(page.data.unwrap_or_default())
            }
        })
        .await
    }

    /// Normalizes one raw record. Returns `None` (a `NormalizationSkip`)
    /// when the record lacks a question or usable prices.
    pub fn normalize(raw: &RawMarket) -> Option<NormalizedMarket> {
        let question = raw.question.as_ref().filter(|q| !q.trim().is_empty())?;

        if raw.tokens.is_empty() {
            return None;
        }

        let mut outcomes: Vec<Outcome> = raw
            .tokens
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let mut price = t.price;
                if price > 1.0 {
                    price /= 100.0;
                }
                Outcome { name: t.outcome.clone(), price: price.clamp(0.0, 1.0), rank: i as u32, image: None }
            })
            .collect();

        if outcomes.iter().all(|o| o.price == 0.0) {
            return None;
        }

        outcomes.sort_by_key(|o| o.rank);

        let end_date = raw
            .end_date_iso
            .as_ref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        let category = raw
            .category
            .as_deref()
            .and_then(Category::from_str_loose)
            .unwrap_or_else(|| Category::from_question_keywords(question));

        let spread = NormalizedMarket::compute_spread(&outcomes);

        Some(NormalizedMarket {
            id: format!("venue_a:{}", raw.condition_id),
            venue: Venue::VenueA,
            question: question.clone(),
            outcomes,
            volume_24h: raw.volume_24h.max(0.0),
            liquidity: raw.liquidity.max(0.0),
            spread,
            end_date,
            category,
            closed: raw.closed,
            resolved: raw.archived,
            last_update: Utc::now(),
        })
    }
}

#[async_trait]
impl VenueAdapter for VenueAAdapter {
    fn venue(&self) -> Venue {
        Venue::VenueA
    }

    async fn fetch_markets(&self, options: FetchOptions) -> Result<Vec<NormalizedMarket>, VenueError> {
        let mut out = Vec::new();
        for page in 0..options.max_pages {
            self.rate_limiter.acquire().await;
            debug!(page, "fetching venue-a page");

            let raws = self.fetch_page(options.status, options.limit, page).await?;

            let page_len = raws.len();
            for raw in &raws {
                match Self::normalize(raw) {
                    Some(m) => out.push(m),
                    None => debug!(id = %raw.condition_id, "normalization skipped record"),
                }
            }

            if page_len < options.limit {
                break;
            }
        }

        info!(count = out.len(), "fetched venue-a markets");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_raw(question: &str, prices: &[(&str, f64)]) -> RawMarket {
        RawMarket {
            condition_id: "c1".to_string(),
            question: Some(question.to_string()),
            end_date_iso: Some("2024-11-06T00:00:00Z".to_string()),
            active: true,
            closed: false,
            archived: false,
            volume_24h: 1500.0,
            liquidity: 2000.0,
            category: None,
            tokens: prices.iter().map(|(o, p)| RawToken { outcome: o.to_string(), price: *p }).collect(),
        }
    }

    #[test]
    fn normalizes_binary_market() {
        let raw = sample_raw("Will Trump win?", &[("Yes", 0.52), ("No", 0.48)]);
        let m = VenueAAdapter::normalize(&raw).unwrap();
        assert_eq!(m.outcomes.len(), 2);
        assert!(m.is_binary());
        assert_eq!(m.venue, Venue::VenueA);
    }

    #[test]
    fn drops_empty_question() {
        let raw = sample_raw("", &[("Yes", 0.5), ("No", 0.5)]);
        assert!(VenueAAdapter::normalize(&raw).is_none());
    }

    #[test]
    fn drops_when_no_tokens() {
        let raw = sample_raw("Will X happen?", &[]);
        assert!(VenueAAdapter::normalize(&raw).is_none());
    }

    #[test]
    fn percentage_encoded_price_is_divided_and_clamped() {
        let raw = sample_raw("Will Y happen?", &[("Yes", 52.0), ("No", 48.0)]);
        let m = VenueAAdapter::normalize(&raw).unwrap();
        assert!((m.yes_outcome().unwrap().price - 0.52).abs() < 1e-9);
    }
}
