//! Core data model shared by every component: venues, normalized markets,
//! unified clusters, and the intermediate entity-extraction result used
//! only by the matching engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// The two venues this system ingests from. A closed enumeration per the
/// REDESIGN FLAGS note against string-typed venue tags — adding a venue
/// means adding a variant, not a new string constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Venue {
    VenueA,
    VenueB,
}

impl Venue {
    pub fn tag(&self) -> &'static str {
        match self {
            Venue::VenueA => "venue_a",
            Venue::VenueB => "venue_b",
        }
    }

    pub fn all() -> [Venue; 2] {
        [Venue::VenueA, Venue::VenueB]
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Coarse category tag, a closed set per spec.md's data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Politics,
    Crypto,
    Sports,
    Economics,
    World,
    Culture,
    Geopolitics,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Politics => "politics",
            Category::Crypto => "crypto",
            Category::Sports => "sports",
            Category::Economics => "economics",
            Category::World => "world",
            Category::Culture => "culture",
            Category::Geopolitics => "geopolitics",
            Category::Other => "other",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Category> {
        match s.to_lowercase().as_str() {
            "politics" => Some(Category::Politics),
            "crypto" | "cryptocurrency" => Some(Category::Crypto),
            "sports" => Some(Category::Sports),
            "economics" | "economy" | "finance" => Some(Category::Economics),
            "world" => Some(Category::World),
            "culture" | "entertainment" => Some(Category::Culture),
            "geopolitics" => Some(Category::Geopolitics),
            "other" => Some(Category::Other),
            _ => None,
        }
    }

    /// Keyword fallback used by adapters when venue metadata carries no
    /// usable category.
    pub fn from_question_keywords(question: &str) -> Category {
        let q = question.to_lowercase();
        const POLITICS: &[&str] = &["election", "president", "senate", "congress", "governor", "vote", "poll"];
        const CRYPTO: &[&str] = &["bitcoin", "btc", "ethereum", "eth", "crypto", "token", "blockchain"];
        const SPORTS: &[&str] = &["championship", "playoff", "league", "tournament", "match", "world cup", "super bowl"];
        const ECONOMICS: &[&str] = &["inflation", "recession", "fed", "interest rate", "gdp", "unemployment"];
        const GEOPOLITICS: &[&str] = &["war", "invasion", "treaty", "sanctions", "ceasefire", "nato"];
        const CULTURE: &[&str] = &["movie", "award", "album", "celebrity", "oscar", "grammy"];

        let hits = |kws: &[&str]| kws.iter().any(|k| q.contains(k));
        if hits(POLITICS) {
            Category::Politics
        } else if hits(CRYPTO) {
            Category::Crypto
        } else if hits(SPORTS) {
            Category::Sports
        } else if hits(ECONOMICS) {
            Category::Economics
        } else if hits(GEOPOLITICS) {
            Category::Geopolitics
        } else if hits(CULTURE) {
            Category::Culture
        } else {
            Category::Other
        }
    }
}

/// One resolvable answer to a market's question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub name: String,
    pub price: f64,
    pub rank: u32,
    pub image: Option<String>,
}

impl Outcome {
    /// Case-insensitive name comparison, per spec.md §9's open question on
    /// outcome-name case-sensitivity.
    pub fn name_matches(&self, other: &str) -> bool {
        self.name.eq_ignore_ascii_case(other)
    }
}

/// A venue's normalized view of one market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedMarket {
    pub id: String,
    pub venue: Venue,
    pub question: String,
    pub outcomes: Vec<Outcome>,
    pub volume_24h: f64,
    pub liquidity: f64,
    pub spread: f64,
    pub end_date: Option<DateTime<Utc>>,
    pub category: Category,
    pub closed: bool,
    pub resolved: bool,
    pub last_update: DateTime<Utc>,
}

impl NormalizedMarket {
    pub fn is_binary(&self) -> bool {
        self.outcomes.len() == 2
            && self.outcomes.iter().any(|o| o.name_matches("yes"))
            && self.outcomes.iter().any(|o| o.name_matches("no"))
    }

    pub fn yes_outcome(&self) -> Option<&Outcome> {
        self.outcomes.iter().find(|o| o.name_matches("yes"))
    }

    pub fn no_outcome(&self) -> Option<&Outcome> {
        self.outcomes.iter().find(|o| o.name_matches("no"))
    }

    /// Derives spread at normalization time: |1 - (yes+no)| for binary
    /// markets, mean absolute deviation from 1/n otherwise.
    pub fn compute_spread(outcomes: &[Outcome]) -> f64 {
        if outcomes.len() == 2 {
            let sum: f64 = outcomes.iter().map(|o| o.price).sum();
            (1.0 - sum).abs()
        } else if outcomes.is_empty() {
            0.0
        } else {
            let fair = 1.0 / outcomes.len() as f64;
            let mad: f64 = outcomes.iter().map(|o| (o.price - fair).abs()).sum::<f64>() / outcomes.len() as f64;
            mad
        }
    }
}

/// A side+venue price pair, used by `best_price` and arbitrage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenuePrice {
    pub venue: Venue,
    pub price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BestPrice {
    pub yes: Option<VenuePrice>,
    pub no: Option<VenuePrice>,
}

/// Cross-venue riskless-profit opportunity, see ArbitrageDetector (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrageOpportunity {
    pub exists: bool,
    pub profit_pct: f64,
    pub total_cost: f64,
    pub yes_buy: VenuePrice,
    pub no_sell: VenuePrice,
    pub detected_at: DateTime<Utc>,
}

/// One of the four trade-routing slots computed per unified cluster. When
/// no member clears the liquidity floor, `venue`/`price`/`execution_score`
/// are `None` and `reason` carries the spec's literal explanation rather
/// than the slot disappearing from the response entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub venue: Option<Venue>,
    pub price: Option<f64>,
    pub execution_score: Option<f64>,
    pub reason: String,
}

impl Recommendation {
    pub fn insufficient_liquidity() -> Self {
        Self {
            venue: None,
            price: None,
            execution_score: None,
            reason: "Insufficient liquidity on all platforms".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRecommendations {
    pub buy_yes: Recommendation,
    pub sell_yes: Recommendation,
    pub buy_no: Recommendation,
    pub sell_no: Recommendation,
}

impl Default for RoutingRecommendations {
    fn default() -> Self {
        Self {
            buy_yes: Recommendation::insufficient_liquidity(),
            sell_yes: Recommendation::insufficient_liquidity(),
            buy_no: Recommendation::insufficient_liquidity(),
            sell_no: Recommendation::insufficient_liquidity(),
        }
    }
}

/// A cluster of one or more `NormalizedMarket`s believed to reference the
/// same real-world question, at most one member per venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedMarket {
    pub unified_id: String,
    pub canonical_question: String,
    pub category: Category,
    pub resolution_date: Option<DateTime<Utc>>,
    pub members: BTreeMap<Venue, NormalizedMarket>,
    pub match_confidence: f64,
    pub combined_volume: f64,
    pub best_price: BestPrice,
    pub liquidity_score: u8,
    pub arbitrage: Option<ArbitrageOpportunity>,
    pub routing_recommendations: RoutingRecommendations,
    pub criteria_mismatch: bool,
}

impl UnifiedMarket {
    pub fn platform_distribution(markets: &[UnifiedMarket]) -> HashMap<&'static str, usize> {
        let mut dist = HashMap::new();
        dist.insert("venue_a", 0usize);
        dist.insert("venue_b", 0usize);
        dist.insert("both", 0usize);
        for m in markets {
            let has_a = m.members.contains_key(&Venue::VenueA);
            let has_b = m.members.contains_key(&Venue::VenueB);
            match (has_a, has_b) {
                (true, true) => *dist.get_mut("both").unwrap() += 1,
                (true, false) => *dist.get_mut("venue_a").unwrap() += 1,
                (false, true) => *dist.get_mut("venue_b").unwrap() += 1,
                (false, false) => {}
            }
        }
        dist
    }
}

/// Intermediate value used only by the matching engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedEntities {
    pub names: Vec<String>,
    pub dates: Vec<String>,
    pub events: Vec<String>,
}

/// Per-venue health state, owned by Cache, written by adapters/Poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueHealth {
    pub status: HealthStatus,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Default for VenueHealth {
    fn default() -> Self {
        Self {
            status: HealthStatus::Degraded,
            last_attempt: None,
            last_success: None,
            last_error: None,
        }
    }
}
