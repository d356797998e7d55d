//! Aggregator: drives parallel venue fetches, invokes the Matching Engine,
//! and computes combined volume, best price, liquidity score, arbitrage,
//! and routing recommendations per cluster. See spec.md §4.4.
//!
//! Grounded on the teacher's `MarketSyncService` (`integration/market_sync.rs`):
//! same "launch one task per source, await all, tolerate partial failure"
//! shape, generalized from two hardcoded clients to the `VenueAdapter` trait.

use crate::arbitrage;
use crate::cache::Cache;
use crate::error::AppError;
use crate::matching;
use crate::types::{
    BestPrice, Category, NormalizedMarket, Recommendation, RoutingRecommendations, UnifiedMarket,
    Venue, VenuePrice,
};
use crate::venue::{FetchOptions, VenueAdapter};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

const MIN_LIQUIDITY_FOR_ROUTING: f64 = 1_000.0;
const LIQUIDITY_NORMALIZER: f64 = 1_000_000.0;
const SPREAD_NORMALIZER: f64 = 0.10;
const EXECUTION_SPREAD_NORMALIZER: f64 = 0.20;
const EXECUTION_LIQUIDITY_NORMALIZER: f64 = 100_000.0;

pub struct FetchAllResult {
    pub by_venue: HashMap<Venue, Vec<NormalizedMarket>>,
    pub total: usize,
    pub duration_ms: u64,
}

/// Drives venue fetches and the enrichment pipeline. Cheap to clone: the
/// adapters and cache are held behind `Arc`, matching the teacher's
/// `MarketSyncService` clone (the Clone impl excludes nothing here since
/// there is no raw HTTP client field on this struct itself).
#[derive(Clone)]
pub struct Aggregator {
    adapters: Arc<Vec<Arc<dyn VenueAdapter>>>,
    cache: Arc<Cache>,
}

impl Aggregator {
    pub fn new(adapters: Vec<Arc<dyn VenueAdapter>>, cache: Arc<Cache>) -> Self {
        Self { adapters: Arc::new(adapters), cache }
    }

    /// Launches one task per venue adapter concurrently and awaits all.
    /// A single venue's failure is captured, not propagated; only total
    /// failure across every venue raises `AllVenuesDown`.
    pub async fn fetch_all_platforms(&self, options: FetchOptions) -> Result<FetchAllResult, AppError> {
        let start = Instant::now();
        let mut tasks = Vec::with_capacity(self.adapters.len());

        for adapter in self.adapters.iter().cloned() {
            tasks.push(tokio::spawn(async move {
                let venue = adapter.venue();
                let result = adapter.fetch_markets(options).await;
                (venue, result)
            }));
        }

        let mut by_venue = HashMap::new();
        let mut all_failed = true;

        for task in tasks {
            match task.await {
                Ok((venue, Ok(markets))) => {
                    all_failed = false;
                    self.cache.mark_healthy(venue).await;
                    by_venue.insert(venue, markets);
                }
                Ok((venue, Err(e))) => {
                    warn!(%venue, error = %e, "venue fetch failed");
                    self.cache.mark_degraded(venue, e.to_string()).await;
                }
                Err(join_err) => {
                    warn!(error = %join_err, "venue fetch task panicked");
                }
            }
        }

        if all_failed {
            return Err(AppError::AllVenuesDown);
        }

        let total = by_venue.values().map(|v| v.len()).sum();
        let duration_ms = start.elapsed().as_millis() as u64;
        info!(total, duration_ms, "fetched all platforms");
        Ok(FetchAllResult { by_venue, total, duration_ms })
    }

    /// Concatenates per-venue sequences, clusters them, and enriches every
    /// resulting cluster.
    pub fn combine(&self, platform_markets: HashMap<Venue, Vec<NormalizedMarket>>) -> Vec<UnifiedMarket> {
        let flat: Vec<NormalizedMarket> = platform_markets.into_values().flatten().collect();
        let clusters = matching::cluster_markets(flat);
        clusters.into_iter().map(|um| Self::enhance(um)).collect()
    }

    /// Pure enrichment function: combined volume, best price, liquidity
    /// score, arbitrage, routing recommendations. Idempotent — safe to call
    /// repeatedly on the same cluster, which the Poller relies on when
    /// patching in place.
    pub fn enhance(mut um: UnifiedMarket) -> UnifiedMarket {
        um.combined_volume = um.members.values().map(|m| m.volume_24h).sum();
        um.best_price = Self::best_price(&um);
        um.liquidity_score = Self::liquidity_score(&um);
        um.arbitrage = arbitrage::detect(&um);
        um.routing_recommendations = Self::routing_recommendations(&um);
        um
    }

    fn best_price(um: &UnifiedMarket) -> BestPrice {
        let mut yes: Option<VenuePrice> = None;
        let mut no: Option<VenuePrice> = None;

        for member in um.members.values() {
            if let Some(o) = member.yes_outcome() {
                if yes.as_ref().map_or(true, |b| o.price > b.price) {
                    yes = Some(VenuePrice { venue: member.venue, price: o.price });
                }
            }
            if let Some(o) = member.no_outcome() {
                if no.as_ref().map_or(true, |b| o.price > b.price) {
                    no = Some(VenuePrice { venue: member.venue, price: o.price });
                }
            }
        }

        BestPrice { yes, no }
    }

    fn liquidity_score(um: &UnifiedMarket) -> u8 {
        let v: f64 = um.members.values().map(|m| m.volume_24h).sum();
        let positive_spreads: Vec<f64> = um.members.values().map(|m| m.spread).filter(|s| *s > 0.0).collect();
        let s = if positive_spreads.is_empty() {
            0.10
        } else {
            positive_spreads.iter().sum::<f64>() / positive_spreads.len() as f64
        };

        let v_hat = (v / LIQUIDITY_NORMALIZER).min(1.0);
        let s_hat = (1.0 / (s * 10.0)).min(1.0);
        let r = 0.4 * v_hat + 0.6 * s_hat;

        let score = (4.0 * r + 1.0).round();
        score.clamp(1.0, 5.0) as u8
    }

    /// `side` true = Yes, false = No. `buy` true = buying (price_quality =
    /// 1 - price), false = selling (price_quality = price).
    fn execution_score(member: &NormalizedMarket, side_is_yes: bool, buy: bool) -> Option<f64> {
        let outcome = if side_is_yes { member.yes_outcome() } else { member.no_outcome() }?;

        let price_quality = if buy { 1.0 - outcome.price } else { outcome.price };
        let spread_quality = (1.0 - member.spread / EXECUTION_SPREAD_NORMALIZER).max(0.0);
        let liquidity_quality = (member.liquidity / EXECUTION_LIQUIDITY_NORMALIZER).min(1.0);

        Some(0.5 * price_quality + 0.3 * spread_quality + 0.2 * liquidity_quality)
    }

    fn route(um: &UnifiedMarket, side_is_yes: bool, buy: bool) -> Recommendation {
        let eligible: Vec<&NormalizedMarket> =
            um.members.values().filter(|m| m.liquidity >= MIN_LIQUIDITY_FOR_ROUTING).collect();

        if eligible.is_empty() {
            return Recommendation::insufficient_liquidity();
        }

        let mut best: Option<(&NormalizedMarket, f64)> = None;
        for member in eligible {
            if let Some(score) = Self::execution_score(member, side_is_yes, buy) {
                if best.as_ref().map_or(true, |(_, s)| score > *s) {
                    best = Some((member, score));
                }
            }
        }

        let Some((member, score)) = best else {
            return Recommendation::insufficient_liquidity();
        };
        let Some(outcome) = (if side_is_yes { member.yes_outcome() } else { member.no_outcome() }) else {
            return Recommendation::insufficient_liquidity();
        };
        let verb = if buy { "Buy" } else { "Sell" };
        let side_name = if side_is_yes { "YES" } else { "NO" };
        let tight = if member.spread < 0.05 { "tight spread" } else { "wider spread" };

        Recommendation {
            venue: Some(member.venue),
            price: Some(outcome.price),
            execution_score: Some(score),
            reason: format!("{} {} on {} at {:.4} ({})", verb, side_name, member.venue, outcome.price, tight),
        }
    }

    fn routing_recommendations(um: &UnifiedMarket) -> RoutingRecommendations {
        RoutingRecommendations {
            buy_yes: Self::route(um, true, true),
            sell_yes: Self::route(um, true, false),
            buy_no: Self::route(um, false, true),
            sell_no: Self::route(um, false, false),
        }
    }

    /// Cache-first lookup by category; `None`/`"all"` disables filtering.
    pub async fn get_unified_markets(
        &self,
        category: Option<Category>,
        options: FetchOptions,
    ) -> Result<Vec<UnifiedMarket>, AppError> {
        if let Some(cached) = self.cache.get_unified_all().await {
            return Ok(Self::filter_category(cached, category));
        }

        let fetched = self.fetch_all_platforms(options).await?;
        let unified = self.combine(fetched.by_venue);
        self.cache.put_unified_all(unified.clone()).await;
        Ok(Self::filter_category(unified, category))
    }

    fn filter_category(markets: Vec<UnifiedMarket>, category: Option<Category>) -> Vec<UnifiedMarket> {
        match category {
            None => markets,
            Some(c) => markets.into_iter().filter(|m| m.category == c).collect(),
        }
    }

    /// Looks up one unified market by id; on miss, refreshes the full view
    /// and retries once before failing with `NotFound`.
    pub async fn get_unified_market(&self, unified_id: &str, options: FetchOptions) -> Result<UnifiedMarket, AppError> {
        if let Some(m) = self.cache.get_unified(unified_id).await {
            return Ok(m);
        }

        let fetched = self.fetch_all_platforms(options).await?;
        let unified = self.combine(fetched.by_venue);
        self.cache.put_unified_all(unified.clone()).await;

        unified
            .into_iter()
            .find(|m| m.unified_id == unified_id)
            .ok_or_else(|| AppError::NotFound(unified_id.to_string()))
    }

    /// Enumerates cached unified markets with a detected opportunity,
    /// sorted by profit descending.
    pub async fn find_arbitrage_opportunities(&self) -> Vec<UnifiedMarket> {
        let cached = self.cache.get_unified_all().await.unwrap_or_default();
        let mut with_arb: Vec<UnifiedMarket> = cached.into_iter().filter(|m| m.arbitrage.is_some()).collect();
        with_arb.sort_by(|a, b| {
            let pa = a.arbitrage.as_ref().map(|x| x.profit_pct).unwrap_or(0.0);
            let pb = b.arbitrage.as_ref().map(|x| x.profit_pct).unwrap_or(0.0);
            pb.partial_cmp(&pa).unwrap()
        });
        with_arb
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Outcome;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn member(venue: Venue, liquidity: f64, spread: f64, yes: f64, no: f64) -> NormalizedMarket {
        NormalizedMarket {
            id: format!("{}:m", venue.tag()),
            venue,
            question: "Will X happen?".to_string(),
            outcomes: vec![
                Outcome { name: "Yes".into(), price: yes, rank: 0, image: None },
                Outcome { name: "No".into(), price: no, rank: 1, image: None },
            ],
            volume_24h: 1000.0,
            liquidity,
            spread,
            end_date: None,
            category: Category::Politics,
            closed: false,
            resolved: false,
            last_update: Utc::now(),
        }
    }

    fn cluster(members: Vec<NormalizedMarket>) -> UnifiedMarket {
        let mut map = BTreeMap::new();
        for m in members {
            map.insert(m.venue, m);
        }
        UnifiedMarket {
            unified_id: "u1".to_string(),
            canonical_question: "Will X happen?".to_string(),
            category: Category::Politics,
            resolution_date: None,
            members: map,
            match_confidence: 1.0,
            combined_volume: 0.0,
            best_price: BestPrice { yes: None, no: None },
            liquidity_score: 1,
            arbitrage: None,
            routing_recommendations: Default::default(),
            criteria_mismatch: false,
        }
    }

    #[test]
    fn best_price_picks_highest_per_side() {
        let um = cluster(vec![member(Venue::VenueA, 2000.0, 0.02, 0.50, 0.45), member(Venue::VenueB, 2000.0, 0.02, 0.55, 0.40)]);
        let enhanced = Aggregator::enhance(um);
        assert_eq!(enhanced.best_price.yes.unwrap().venue, Venue::VenueB);
        assert_eq!(enhanced.best_price.no.unwrap().venue, Venue::VenueA);
    }

    #[test]
    fn liquidity_score_is_within_bounds() {
        let um = cluster(vec![member(Venue::VenueA, 500_000.0, 0.01, 0.5, 0.5)]);
        let enhanced = Aggregator::enhance(um);
        assert!(enhanced.liquidity_score >= 1 && enhanced.liquidity_score <= 5);
    }

    #[test]
    fn routing_excludes_illiquid_members() {
        let um = cluster(vec![member(Venue::VenueA, 500.0, 0.02, 0.5, 0.5)]);
        let enhanced = Aggregator::enhance(um);
        assert!(enhanced.routing_recommendations.buy_yes.venue.is_none());
        assert_eq!(enhanced.routing_recommendations.buy_yes.reason, "Insufficient liquidity on all platforms");
    }

    #[test]
    fn combined_volume_sums_members() {
        let um = cluster(vec![member(Venue::VenueA, 2000.0, 0.02, 0.5, 0.5), member(Venue::VenueB, 2000.0, 0.02, 0.5, 0.5)]);
        let enhanced = Aggregator::enhance(um);
        assert!((enhanced.combined_volume - 2000.0).abs() < 1e-9);
    }

    #[test]
    fn enhance_is_idempotent() {
        let um = cluster(vec![member(Venue::VenueA, 2000.0, 0.02, 0.40, 0.30), member(Venue::VenueB, 2000.0, 0.02, 0.55, 0.58)]);
        let once = Aggregator::enhance(um);
        let twice = Aggregator::enhance(once.clone());
        assert_eq!(once.liquidity_score, twice.liquidity_score);
        assert_eq!(once.combined_volume, twice.combined_volume);
    }
}
