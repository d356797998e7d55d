//! Matching Engine: decides whether two normalized markets describe the
//! same event and groups markets into unified clusters. Deterministic and
//! explainable by design — no learned scoring, see spec.md §4.2.

use crate::types::{ExtractedEntities, NormalizedMarket, UnifiedMarket, Venue};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};

const THRESHOLD: f64 = 0.85;

const STOP_WORDS: &[&str] =
    &["will", "the", "a", "an", "be", "to", "of", "in", "on", "at", "for", "by"];

const EVENT_VOCAB: &[&str] = &[
    "election", "championship", "win", "resign", "launch", "debate", "vote", "impeach",
    "nominate", "invade", "sanction", "ceasefire", "merger", "acquisition", "ipo", "recall",
    "indict", "convict", "acquit", "default", "recession", "strike", "summit", "treaty",
    "referendum", "coup", "bankruptcy", "recall", "shutdown", "veto", "primary",
];

static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Z][a-z]+(?: [A-Z][a-z]+)+").unwrap());
static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(19|20)\d{2}\b").unwrap());
static MONTH_DAY_YEAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(January|February|March|April|May|June|July|August|September|October|November|December) \d{1,2},? \d{4}\b").unwrap()
});
static MONTH_YEAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(January|February|March|April|May|June|July|August|September|October|November|December) \d{4}\b").unwrap()
});

/// Lowercases, strips non-alphanumerics to spaces, collapses whitespace,
/// drops stop words.
fn normalize_text(q: &str) -> String {
    let lowered = q.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned
        .split_whitespace()
        .filter(|w| !STOP_WORDS.contains(w))
        .collect::<Vec<_>>()
        .join(" ")
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (n, m) = (a.len(), b.len());
    if n == 0 {
        return m;
    }
    if m == 0 {
        return n;
    }
    let mut prev: Vec<usize> = (0..=m).collect();
    let mut cur = vec![0usize; m + 1];
    for i in 1..=n {
        cur[0] = i;
        for j in 1..=m {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            cur[j] = (prev[j] + 1).min(cur[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[m]
}

/// Text similarity per spec.md §4.2: normalize, Levenshtein, clamp.
pub fn text_similarity(q1: &str, q2: &str) -> f64 {
    let n1 = normalize_text(q1);
    let n2 = normalize_text(q2);
    if n1.is_empty() && n2.is_empty() {
        return 1.0;
    }
    if n1.is_empty() || n2.is_empty() {
        return 0.0;
    }
    let d = levenshtein(&n1, &n2) as f64;
    let max_len = n1.chars().count().max(n2.chars().count()) as f64;
    (1.0 - d / max_len).clamp(0.0, 1.0)
}

/// Extracts names, dates, and domain-event keywords from a question.
pub fn extract_entities(q: &str) -> ExtractedEntities {
    let names: HashSet<String> = NAME_RE.find_iter(q).map(|m| m.as_str().to_string()).collect();

    let mut dates: HashSet<String> = HashSet::new();
    for m in YEAR_RE.find_iter(q) {
        dates.insert(m.as_str().to_string());
    }
    for m in MONTH_DAY_YEAR_RE.find_iter(q) {
        dates.insert(m.as_str().to_string());
    }
    for m in MONTH_YEAR_RE.find_iter(q) {
        dates.insert(m.as_str().to_string());
    }

    let lowered = q.to_lowercase();
    let events: HashSet<String> =
        EVENT_VOCAB.iter().filter(|kw| lowered.contains(*kw)).map(|kw| kw.to_string()).collect();

    ExtractedEntities {
        names: names.into_iter().collect(),
        dates: dates.into_iter().collect(),
        events: events.into_iter().collect(),
    }
}

fn category_score(a: &[String], b: &[String]) -> Option<f64> {
    if a.is_empty() && b.is_empty() {
        return None;
    }
    let matches = a
        .iter()
        .filter(|x| {
            b.iter().any(|y| {
                x.eq_ignore_ascii_case(y)
                    || x.to_lowercase().contains(&y.to_lowercase())
                    || y.to_lowercase().contains(&x.to_lowercase())
            })
        })
        .count();
    let denom = a.len().max(b.len()) as f64;
    Some(matches as f64 / denom)
}

/// Weighted entity comparison: names 0.4, dates 0.4, events 0.2 over
/// non-skipped categories.
pub fn entity_score(e1: &ExtractedEntities, e2: &ExtractedEntities) -> f64 {
    let weighted = [
        (category_score(&e1.names, &e2.names), 0.4),
        (category_score(&e1.dates, &e2.dates), 0.4),
        (category_score(&e1.events, &e2.events), 0.2),
    ];

    let total_weight: f64 = weighted.iter().filter_map(|(s, w)| s.map(|_| *w)).sum();
    if total_weight == 0.0 {
        return 0.0;
    }

    let sum: f64 = weighted.iter().filter_map(|(s, w)| s.map(|v| v * w)).sum();
    sum / total_weight
}

/// Date comparison bucketed by absolute day difference.
pub fn date_score(d1: Option<DateTime<Utc>>, d2: Option<DateTime<Utc>>) -> f64 {
    match (d1, d2) {
        (None, None) => 1.0,
        (None, Some(_)) | (Some(_), None) => 0.5,
        (Some(a), Some(b)) => {
            let diff = (a - b).num_days().abs();
            if diff == 0 {
                1.0
            } else if diff <= 1 {
                0.9
            } else if diff <= 7 {
                0.7
            } else if diff <= 30 {
                0.5
            } else {
                0.0
            }
        }
    }
}

/// Match confidence: `0.5·text + 0.3·entity + 0.2·date`.
pub fn match_confidence(a: &NormalizedMarket, b: &NormalizedMarket) -> f64 {
    let text = text_similarity(&a.question, &b.question);
    let ea = extract_entities(&a.question);
    let eb = extract_entities(&b.question);
    let entity = entity_score(&ea, &eb);
    let date = date_score(a.end_date, b.end_date);
    0.5 * text + 0.3 * entity + 0.2 * date
}

fn canonical_question<'a>(members: impl Iterator<Item = &'a NormalizedMarket>) -> String {
    members
        .map(|m| m.question.clone())
        .fold(String::new(), |best, q| {
            if q.len() > best.len() || (q.len() == best.len() && q < best) {
                q
            } else {
                best
            }
        })
}

fn pick_category<'a>(members: impl Iterator<Item = &'a NormalizedMarket>) -> crate::types::Category {
    use crate::types::Category;
    members
        .map(|m| m.category)
        .find(|c| *c != Category::Other)
        .unwrap_or(Category::Other)
}

fn pick_resolution_date<'a>(
    members: impl Iterator<Item = &'a NormalizedMarket>,
) -> Option<DateTime<Utc>> {
    members.filter_map(|m| m.end_date).min()
}

/// Builds the skeleton of a UnifiedMarket from its members; enrichment
/// (volume, best price, liquidity, arbitrage, routing) is the Aggregator's
/// job (`enhance`), kept separate so Poller patching can call it alone.
fn build_unified(cluster: Vec<NormalizedMarket>) -> UnifiedMarket {
    let mut ids: Vec<&str> = cluster.iter().map(|m| m.id.as_str()).collect();
    ids.sort_unstable();
    let unified_id = format!("{:x}", hash_ids(&ids));

    let confidence = if cluster.len() <= 1 {
        1.0
    } else {
        let mut total = 0.0;
        let mut pairs = 0;
        for i in 0..cluster.len() {
            for j in (i + 1)..cluster.len() {
                total += match_confidence(&cluster[i], &cluster[j]);
                pairs += 1;
            }
        }
        if pairs == 0 {
            1.0
        } else {
            total / pairs as f64
        }
    };

    let resolution_dates: Vec<DateTime<Utc>> = cluster.iter().filter_map(|m| m.end_date).collect();
    let criteria_mismatch = resolution_dates.len() >= 2 && {
        let min = resolution_dates.iter().min().unwrap();
        let max = resolution_dates.iter().max().unwrap();
        (*max - *min).num_days() > 7
    };

    let canonical_question = canonical_question(cluster.iter());
    let category = pick_category(cluster.iter());
    let resolution_date = pick_resolution_date(cluster.iter());

    let mut members = BTreeMap::new();
    for m in cluster {
        members.insert(m.venue, m);
    }

    UnifiedMarket {
        unified_id,
        canonical_question,
        category,
        resolution_date,
        members,
        match_confidence: confidence,
        combined_volume: 0.0,
        best_price: crate::types::BestPrice { yes: None, no: None },
        liquidity_score: 1,
        arbitrage: None,
        routing_recommendations: Default::default(),
        criteria_mismatch,
    }
}

fn hash_ids(ids: &[&str]) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    for id in ids {
        id.hash(&mut hasher);
    }
    hasher.finish()
}

/// Groups a flat sequence of markets into unified clusters. One market per
/// venue per cluster; input-order first-wins on ties, O(n²) pairwise.
pub fn cluster_markets(markets: Vec<NormalizedMarket>) -> Vec<UnifiedMarket> {
    let n = markets.len();
    let mut processed = vec![false; n];
    let mut clusters: Vec<Vec<usize>> = Vec::new();

    for i in 0..n {
        if processed[i] {
            continue;
        }
        processed[i] = true;
        let mut cluster = vec![i];
        let mut venues_used: HashSet<Venue> = HashSet::new();
        venues_used.insert(markets[i].venue);

        for j in (i + 1)..n {
            if processed[j] {
                continue;
            }
            if venues_used.contains(&markets[j].venue) {
                continue;
            }
            let confidence = match_confidence(&markets[i], &markets[j]);
            if confidence >= THRESHOLD {
                processed[j] = true;
                venues_used.insert(markets[j].venue);
                cluster.push(j);
            }
        }
        clusters.push(cluster);
    }

    let mut markets: Vec<Option<NormalizedMarket>> = markets.into_iter().map(Some).collect();
    clusters
        .into_iter()
        .map(|idxs| {
            let members: Vec<NormalizedMarket> =
                idxs.into_iter().map(|i| markets[i].take().unwrap()).collect();
            build_unified(members)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, Outcome, Venue};

    fn market(venue: Venue, id: &str, question: &str) -> NormalizedMarket {
        NormalizedMarket {
            id: id.to_string(),
            venue,
            question: question.to_string(),
            outcomes: vec![
                Outcome { name: "Yes".into(), price: 0.5, rank: 0, image: None },
                Outcome { name: "No".into(), price: 0.5, rank: 1, image: None },
            ],
            volume_24h: 1000.0,
            liquidity: 5000.0,
            spread: 0.0,
            end_date: None,
            category: Category::Politics,
            closed: false,
            resolved: false,
            last_update: Utc::now(),
        }
    }

    #[test]
    fn identical_questions_score_near_one() {
        let s = text_similarity("Will Trump win the election?", "Will Trump win the election?");
        assert!((s - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_vs_empty_is_one() {
        assert!((text_similarity("the a an", "will to of") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_vs_nonempty_is_zero() {
        assert_eq!(text_similarity("the a an", "bitcoin price target"), 0.0);
    }

    #[test]
    fn extracts_year_and_capitalized_names() {
        let e = extract_entities("Will Donald Trump win the 2024 election?");
        assert!(e.names.contains(&"Donald Trump".to_string()));
        assert!(e.dates.contains(&"2024".to_string()));
        assert!(e.events.contains(&"election".to_string()));
    }

    #[test]
    fn date_score_buckets() {
        let a = Utc::now();
        assert_eq!(date_score(None, None), 1.0);
        assert_eq!(date_score(Some(a), None), 0.5);
        assert_eq!(date_score(Some(a), Some(a)), 1.0);
    }

    #[test]
    fn clusters_same_event_across_venues_one_per_venue() {
        let markets = vec![
            market(Venue::VenueA, "venue_a:1", "Will Donald Trump win the 2024 presidential election?"),
            market(Venue::VenueB, "venue_b:1", "Will Donald Trump win the 2024 presidential election?"),
        ];
        let clusters = cluster_markets(markets);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members.len(), 2);
    }

    #[test]
    fn distinct_questions_do_not_cluster() {
        let markets = vec![
            market(Venue::VenueA, "venue_a:1", "Will Donald Trump win the 2024 presidential election?"),
            market(Venue::VenueB, "venue_b:1", "Will Bitcoin exceed $100,000 by end of year?"),
        ];
        let clusters = cluster_markets(markets);
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn same_venue_never_shares_a_cluster() {
        let markets = vec![
            market(Venue::VenueA, "venue_a:1", "Will Donald Trump win the 2024 presidential election?"),
            market(Venue::VenueA, "venue_a:2", "Will Donald Trump win the 2024 presidential election?"),
        ];
        let clusters = cluster_markets(markets);
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(cluster_markets(vec![]).is_empty());
    }
}
