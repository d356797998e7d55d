//! Typed in-memory cache with four TTL regions, LRU eviction on the `full`
//! region, access-frequency tracking, and per-venue health state. See
//! spec.md §4.5.
//!
//! Grounded on the teacher's `CacheService`/`CacheStats` (`cache.rs`): same
//! hit/miss/debug-log shape, Redis swapped for `dashmap` since spec.md's
//! Non-goals exclude persistence across restarts — every region lives in
//! process memory and is gone on restart by design.

use crate::config::CacheTtlConfig;
use crate::types::{Category, HealthStatus, NormalizedMarket, UnifiedMarket, Venue, VenueHealth};
use chrono::Utc;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tokio::time;
use tracing::{debug, info};

const DEFAULT_METADATA_TTL: Duration = Duration::from_secs(10 * 60);
const DEFAULT_FULL_TTL: Duration = Duration::from_secs(5 * 60);
const DEFAULT_UNIFIED_TTL: Duration = Duration::from_secs(5 * 60);
const DEFAULT_MATCH_CONFIDENCE_TTL: Duration = Duration::from_secs(10 * 60);

const FULL_CAP: usize = 500;
const FULL_EVICT_FRACTION: f64 = 0.20;
const METADATA_HIT_THRESHOLD: u32 = 5;
const METADATA_TTL_EXTENSION: Duration = Duration::from_secs(5 * 60);
const METADATA_INACTIVE_AFTER: Duration = Duration::from_secs(15 * 60);
const VENUE_STALE_AFTER: i64 = 60;
const CLEANUP_INTERVAL: Duration = Duration::from_secs(2 * 60);

#[derive(Debug, Default, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub evictions: u64,
}

struct RegionEntry<T> {
    value: T,
    inserted_at: Instant,
    ttl: Duration,
    last_access: Instant,
    hits: u32,
    ttl_extended: bool,
}

impl<T> RegionEntry<T> {
    fn new(value: T, ttl: Duration) -> Self {
        let now = Instant::now();
        Self { value, inserted_at: now, ttl, last_access: now, hits: 0, ttl_extended: false }
    }

    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() > self.ttl
    }

    fn touch(&mut self) -> u32 {
        self.last_access = Instant::now();
        self.hits += 1;
        self.hits
    }
}

pub struct Cache {
    metadata: DashMap<Category, RegionEntry<Vec<NormalizedMarket>>>,
    full: DashMap<String, RegionEntry<NormalizedMarket>>,
    unified: DashMap<String, RegionEntry<UnifiedMarket>>,
    match_confidence: DashMap<(String, String), RegionEntry<f64>>,
    health: DashMap<Venue, VenueHealth>,
    stats: DashMap<&'static str, CacheStats>,
    metadata_ttl: Duration,
    full_ttl: Duration,
    unified_ttl: Duration,
    match_confidence_ttl: Duration,
}

impl Cache {
    pub fn new() -> Self {
        Self::with_ttls(DEFAULT_METADATA_TTL, DEFAULT_FULL_TTL, DEFAULT_UNIFIED_TTL, DEFAULT_MATCH_CONFIDENCE_TTL)
    }

    /// Builds a Cache whose region TTLs come from `CACHE_TTL_*` env vars
    /// (spec.md §6), falling back to the spec's defaults for any unset.
    pub fn from_config(ttl: &CacheTtlConfig) -> Self {
        Self::with_ttls(
            Duration::from_millis(ttl.metadata_ms),
            Duration::from_millis(ttl.full_ms),
            Duration::from_millis(ttl.unified_ms),
            Duration::from_millis(ttl.match_confidence_ms),
        )
    }

    fn with_ttls(metadata_ttl: Duration, full_ttl: Duration, unified_ttl: Duration, match_confidence_ttl: Duration) -> Self {
        Self {
            metadata: DashMap::new(),
            full: DashMap::new(),
            unified: DashMap::new(),
            match_confidence: DashMap::new(),
            health: DashMap::new(),
            stats: DashMap::new(),
            metadata_ttl,
            full_ttl,
            unified_ttl,
            match_confidence_ttl,
        }
    }

    fn record(&self, region: &'static str, hit: bool) {
        let mut entry = self.stats.entry(region).or_default();
        if hit {
            entry.hits += 1;
        } else {
            entry.misses += 1;
        }
    }

    // ---- metadata region ----

    pub fn get_metadata(&self, category: Category) -> Option<Vec<NormalizedMarket>> {
        if let Some(mut e) = self.metadata.get_mut(&category) {
            if e.is_expired() {
                self.record("metadata", false);
                return None;
            }
            let hits = e.touch();
            if hits >= METADATA_HIT_THRESHOLD && !e.ttl_extended {
                e.ttl += METADATA_TTL_EXTENSION;
                e.ttl_extended = true;
                debug!(?category, "metadata TTL extended after hit threshold");
            }
            self.record("metadata", true);
            return Some(e.value.clone());
        }
        self.record("metadata", false);
        None
    }

    pub fn put_metadata(&self, category: Category, markets: Vec<NormalizedMarket>) {
        self.metadata.insert(category, RegionEntry::new(markets, self.metadata_ttl));
        self.stats.entry("metadata").or_default().sets += 1;
    }

    // ---- full region (single-market snapshots, used by the Poller for diffing) ----

    pub fn get_full(&self, market_id: &str) -> Option<NormalizedMarket> {
        if let Some(mut e) = self.full.get_mut(market_id) {
            if e.is_expired() {
                self.record("full", false);
                return None;
            }
            e.touch();
            self.record("full", true);
            return Some(e.value.clone());
        }
        self.record("full", false);
        None
    }

    pub fn put_full(&self, market: NormalizedMarket) {
        self.full.insert(market.id.clone(), RegionEntry::new(market, self.full_ttl));
        self.stats.entry("full").or_default().sets += 1;
        self.enforce_full_cap();
    }

    fn enforce_full_cap(&self) {
        if self.full.len() <= FULL_CAP {
            return;
        }
        let mut entries: Vec<(String, Instant)> =
            self.full.iter().map(|r| (r.key().clone(), r.value().last_access)).collect();
        entries.sort_by_key(|(_, last_access)| *last_access);

        let evict_count = ((entries.len() as f64) * FULL_EVICT_FRACTION).ceil() as usize;
        for (id, _) in entries.into_iter().take(evict_count) {
            self.full.remove(&id);
        }
        let mut stats = self.stats.entry("full").or_default();
        stats.evictions += evict_count as u64;
        info!(evict_count, "full region LRU eviction");
    }

    // ---- unified region ----

    pub async fn get_unified(&self, unified_id: &str) -> Option<UnifiedMarket> {
        if let Some(mut e) = self.unified.get_mut(unified_id) {
            if e.is_expired() {
                self.record("unified", false);
                return None;
            }
            e.touch();
            self.record("unified", true);
            return Some(e.value.clone());
        }
        self.record("unified", false);
        None
    }

    pub async fn put_unified(&self, um: UnifiedMarket) {
        self.unified.insert(um.unified_id.clone(), RegionEntry::new(um, self.unified_ttl));
        self.stats.entry("unified").or_default().sets += 1;
    }

    /// Returns the full set of live unified markets, or `None` if the
    /// region is empty (treated as a cache miss by the Aggregator).
    pub async fn get_unified_all(&self) -> Option<Vec<UnifiedMarket>> {
        let live: Vec<UnifiedMarket> = self
            .unified
            .iter()
            .filter(|r| !r.value().is_expired())
            .map(|r| r.value().value.clone())
            .collect();
        if live.is_empty() {
            self.record("unified", false);
            None
        } else {
            self.record("unified", true);
            Some(live)
        }
    }

    pub async fn put_unified_all(&self, markets: Vec<UnifiedMarket>) {
        self.unified.clear();
        for um in markets {
            self.unified.insert(um.unified_id.clone(), RegionEntry::new(um, self.unified_ttl));
        }
        self.stats.entry("unified").or_default().sets += 1;
    }

    // ---- match_confidence region ----

    fn confidence_key(id_a: &str, id_b: &str) -> (String, String) {
        if id_a <= id_b {
            (id_a.to_string(), id_b.to_string())
        } else {
            (id_b.to_string(), id_a.to_string())
        }
    }

    pub fn get_match_confidence(&self, id_a: &str, id_b: &str) -> Option<f64> {
        let key = Self::confidence_key(id_a, id_b);
        if let Some(mut e) = self.match_confidence.get_mut(&key) {
            if e.is_expired() {
                self.record("match_confidence", false);
                return None;
            }
            e.touch();
            self.record("match_confidence", true);
            return Some(e.value);
        }
        self.record("match_confidence", false);
        None
    }

    pub fn put_match_confidence(&self, id_a: &str, id_b: &str, confidence: f64) {
        let key = Self::confidence_key(id_a, id_b);
        self.match_confidence.insert(key, RegionEntry::new(confidence, self.match_confidence_ttl));
        self.stats.entry("match_confidence").or_default().sets += 1;
    }

    // ---- venue health ----

    pub async fn mark_healthy(&self, venue: Venue) {
        let now = Utc::now();
        self.health
            .entry(venue)
            .and_modify(|h| {
                h.status = HealthStatus::Healthy;
                h.last_attempt = Some(now);
                h.last_success = Some(now);
                h.last_error = None;
            })
            .or_insert(VenueHealth {
                status: HealthStatus::Healthy,
                last_attempt: Some(now),
                last_success: Some(now),
                last_error: None,
            });
    }

    pub async fn mark_degraded(&self, venue: Venue, error: String) {
        let now = Utc::now();
        self.health
            .entry(venue)
            .and_modify(|h| {
                h.status = HealthStatus::Degraded;
                h.last_attempt = Some(now);
                h.last_error = Some(error.clone());
            })
            .or_insert(VenueHealth {
                status: HealthStatus::Degraded,
                last_attempt: Some(now),
                last_success: None,
                last_error: Some(error),
            });
    }

    /// Downgrades any `healthy` venue whose last success is older than 60s.
    pub fn auto_degrade_stale(&self) {
        for mut entry in self.health.iter_mut() {
            if entry.status == HealthStatus::Healthy {
                if let Some(last_success) = entry.last_success {
                    if (Utc::now() - last_success).num_seconds() > VENUE_STALE_AFTER {
                        entry.status = HealthStatus::Degraded;
                        entry.last_error = Some("no successful fetch in over 60s".to_string());
                    }
                }
            }
        }
    }

    pub fn get_health(&self, venue: Venue) -> VenueHealth {
        self.health.get(&venue).map(|r| r.value().clone()).unwrap_or_default()
    }

    pub fn all_health(&self) -> Vec<(Venue, VenueHealth)> {
        self.health.iter().map(|r| (*r.key(), r.value().clone())).collect()
    }

    pub fn stats_snapshot(&self) -> Vec<(&'static str, CacheStats)> {
        self.stats.iter().map(|r| (*r.key(), r.value().clone())).collect()
    }

    /// Purges expired entries, enforces the `full` cap, and evicts
    /// metadata categories untouched for 15 minutes. Runs every 2
    /// minutes from `spawn_cleanup_task`.
    pub fn cleanup(&self) {
        self.metadata.retain(|_, e| !e.is_expired() && e.last_access.elapsed() < METADATA_INACTIVE_AFTER);
        self.full.retain(|_, e| !e.is_expired());
        self.unified.retain(|_, e| !e.is_expired());
        self.match_confidence.retain(|_, e| !e.is_expired());
        self.enforce_full_cap();
        self.auto_degrade_stale();
        debug!(
            metadata = self.metadata.len(),
            full = self.full.len(),
            unified = self.unified.len(),
            "cache cleanup pass complete"
        );
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns the periodic cleanup task. Returns the `JoinHandle` so callers
/// can abort it on shutdown.
pub fn spawn_cleanup_task(cache: std::sync::Arc<Cache>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            cache.cleanup();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Outcome;

    fn sample_market(id: &str) -> NormalizedMarket {
        NormalizedMarket {
            id: id.to_string(),
            venue: Venue::VenueA,
            question: "Will X happen?".to_string(),
            outcomes: vec![
                Outcome { name: "Yes".into(), price: 0.5, rank: 0, image: None },
                Outcome { name: "No".into(), price: 0.5, rank: 1, image: None },
            ],
            volume_24h: 100.0,
            liquidity: 500.0,
            spread: 0.0,
            end_date: None,
            category: Category::Politics,
            closed: false,
            resolved: false,
            last_update: Utc::now(),
        }
    }

    #[test]
    fn full_region_round_trips() {
        let cache = Cache::new();
        cache.put_full(sample_market("venue_a:1"));
        assert!(cache.get_full("venue_a:1").is_some());
        assert!(cache.get_full("missing").is_none());
    }

    #[test]
    fn full_region_evicts_oldest_when_over_cap() {
        let cache = Cache::new();
        for i in 0..520 {
            cache.put_full(sample_market(&format!("venue_a:{i}")));
        }
        assert!(cache.full.len() <= 520);
        cache.enforce_full_cap();
        assert!(cache.full.len() < 520);
    }

    #[tokio::test]
    async fn unified_all_is_none_when_empty() {
        let cache = Cache::new();
        assert!(cache.get_unified_all().await.is_none());
    }

    #[test]
    fn match_confidence_key_is_order_independent() {
        let cache = Cache::new();
        cache.put_match_confidence("a", "b", 0.9);
        assert_eq!(cache.get_match_confidence("b", "a"), Some(0.9));
    }

    #[tokio::test]
    async fn venue_health_starts_degraded_then_can_heal() {
        let cache = Cache::new();
        assert_eq!(cache.get_health(Venue::VenueA).status, HealthStatus::Degraded);
        cache.mark_healthy(Venue::VenueA).await;
        assert_eq!(cache.get_health(Venue::VenueA).status, HealthStatus::Healthy);
    }

    #[test]
    fn metadata_ttl_extends_after_hit_threshold() {
        let cache = Cache::new();
        cache.put_metadata(Category::Politics, vec![sample_market("venue_a:1")]);
        for _ in 0..5 {
            cache.get_metadata(Category::Politics);
        }
        let entry = cache.metadata.get(&Category::Politics).unwrap();
        assert!(entry.ttl_extended);
    }
}
