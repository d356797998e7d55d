//! Arbitrage Detector: finds riskless cross-venue YES/NO price pairs over
//! a unified cluster. See spec.md §4.3.

use crate::types::{ArbitrageOpportunity, UnifiedMarket, VenuePrice};
use chrono::Utc;

pub const MIN_PROFIT_PCT: f64 = 2.0;
pub const MAX_COMBINED_PRICE: f64 = 0.95;

/// A generated, human-readable execution plan for one opportunity.
#[derive(Debug, Clone)]
pub struct ArbitrageInstructions {
    pub steps: Vec<String>,
    pub summary: String,
    pub explanation: String,
    pub cautions: Vec<String>,
}

fn valid_price(p: f64) -> bool {
    p > 0.0 && p < 1.0
}

/// Finds the lowest Yes price and the lowest No price across members
/// (each in the open interval (0,1)) — the combination that minimizes
/// total cost — and emits an opportunity when the combined cost leaves
/// enough margin. Needs at least two members.
pub fn detect(um: &UnifiedMarket) -> Option<ArbitrageOpportunity> {
    if um.members.len() < 2 {
        return None;
    }

    let mut best_yes: Option<VenuePrice> = None;
    let mut best_no: Option<VenuePrice> = None;

    for member in um.members.values() {
        if let Some(yes) = member.yes_outcome() {
            if valid_price(yes.price) {
                if best_yes.as_ref().map_or(true, |b| yes.price < b.price) {
                    best_yes = Some(VenuePrice { venue: member.venue, price: yes.price });
                }
            }
        }
        if let Some(no) = member.no_outcome() {
            if valid_price(no.price) {
                if best_no.as_ref().map_or(true, |b| no.price < b.price) {
                    best_no = Some(VenuePrice { venue: member.venue, price: no.price });
                }
            }
        }
    }

    let yes_buy = best_yes?;
    let no_sell = best_no?;

    let total = yes_buy.price + no_sell.price;
    if total >= MAX_COMBINED_PRICE {
        return None;
    }

    let profit_pct = (1.0 - total) / total * 100.0;
    if profit_pct < MIN_PROFIT_PCT {
        return None;
    }

    Some(ArbitrageOpportunity {
        exists: true,
        profit_pct,
        total_cost: total,
        yes_buy,
        no_sell,
        detected_at: Utc::now(),
    })
}

/// Pure function over a detected opportunity; produces the three-step
/// plan, a plain summary and explanation, and mandatory cautions.
pub fn generate_instructions(op: &ArbitrageOpportunity) -> ArbitrageInstructions {
    let per_dollar_cents = (1.0 - op.total_cost) * 100.0;

    let steps = vec![
        format!("Buy YES on {} at {:.4}", op.yes_buy.venue, op.yes_buy.price),
        format!("Sell YES on {} at {:.4}", op.no_sell.venue, op.no_sell.price),
        format!("Collect {:.2}\u{a2} per $1 regardless of outcome", per_dollar_cents),
    ];

    let summary = format!(
        "{:.2}% riskless profit by buying YES on {} and selling on {}",
        op.profit_pct, op.yes_buy.venue, op.no_sell.venue
    );

    let explanation = format!(
        "Total cost to lock in $1 of payoff is {:.4} ({} YES + {} NO), leaving {:.2}\u{a2} of riskless profit per dollar.",
        op.total_cost, op.yes_buy.venue, op.no_sell.venue, per_dollar_cents
    );

    let mut cautions = Vec::new();
    if op.profit_pct < 3.0 {
        cautions.push("Margin is thin; fees may exhaust profit".to_string());
    }
    if op.profit_pct > 10.0 {
        cautions.push("Unusually large spread; verify data accuracy before trading".to_string());
    }

    ArbitrageInstructions { steps, summary, explanation, cautions }
}

/// Applies `detect` across a sequence of clusters and returns the found
/// opportunities paired with their cluster id, sorted by profit descending.
pub fn detect_batch(clusters: &[UnifiedMarket]) -> Vec<(String, ArbitrageOpportunity)> {
    let mut found: Vec<(String, ArbitrageOpportunity)> = clusters
        .iter()
        .filter_map(|um| detect(um).map(|op| (um.unified_id.clone(), op)))
        .collect();

    found.sort_by(|a, b| b.1.profit_pct.partial_cmp(&a.1.profit_pct).unwrap());
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, NormalizedMarket, Outcome, Venue};
    use std::collections::BTreeMap;

    fn member(venue: Venue, yes: f64, no: f64) -> NormalizedMarket {
        NormalizedMarket {
            id: format!("{}:m", venue.tag()),
            venue,
            question: "Will X happen?".to_string(),
            outcomes: vec![
                Outcome { name: "Yes".into(), price: yes, rank: 0, image: None },
                Outcome { name: "No".into(), price: no, rank: 1, image: None },
            ],
            volume_24h: 1000.0,
            liquidity: 5000.0,
            spread: (1.0 - (yes + no)).abs(),
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
            best_price: crate::types::BestPrice { yes: None, no: None },
            liquidity_score: 3,
            arbitrage: None,
            routing_recommendations: Default::default(),
            criteria_mismatch: false,
        }
    }

    #[test]
    fn detects_arbitrage_when_combined_price_is_low() {
        let um = cluster(vec![member(Venue::VenueA, 0.40, 0.30), member(Venue::VenueB, 0.55, 0.58)]);
        let op = detect(&um).unwrap();
        assert!((op.total_cost - 0.70).abs() < 1e-9);
        assert!(op.profit_pct > MIN_PROFIT_PCT);
    }

    #[test]
    fn rejects_when_combined_price_too_high() {
        let um = cluster(vec![member(Venue::VenueA, 0.50, 0.49), member(Venue::VenueB, 0.51, 0.50)]);
        assert!(detect(&um).is_none());
    }

    #[test]
    fn rejects_single_member() {
        let um = cluster(vec![member(Venue::VenueA, 0.40, 0.30)]);
        assert!(detect(&um).is_none());
    }

    #[test]
    fn thin_margin_gets_fee_caution() {
        let op = ArbitrageOpportunity {
            exists: true,
            profit_pct: 2.5,
            total_cost: 0.9756,
            yes_buy: VenuePrice { venue: Venue::VenueA, price: 0.40 },
            no_sell: VenuePrice { venue: Venue::VenueB, price: 0.5756 },
            detected_at: Utc::now(),
        };
        let instr = generate_instructions(&op);
        assert!(instr.cautions.iter().any(|c| c.contains("fees")));
    }

    #[test]
    fn large_spread_gets_accuracy_caution() {
        let op = ArbitrageOpportunity {
            exists: true,
            profit_pct: 15.0,
            total_cost: 0.87,
            yes_buy: VenuePrice { venue: Venue::VenueA, price: 0.40 },
            no_sell: VenuePrice { venue: Venue::VenueB, price: 0.47 },
            detected_at: Utc::now(),
        };
        let instr = generate_instructions(&op);
        assert!(instr.cautions.iter().any(|c| c.contains("verify data accuracy")));
    }

    #[test]
    fn batch_sorts_by_profit_descending() {
        let low = cluster(vec![member(Venue::VenueA, 0.45, 0.40), member(Venue::VenueB, 0.50, 0.50)]);
        let high = cluster(vec![member(Venue::VenueA, 0.30, 0.20), member(Venue::VenueB, 0.60, 0.60)]);
        let results = detect_batch(&[low, high]);
        assert_eq!(results.len(), 2);
        assert!(results[0].1.profit_pct >= results[1].1.profit_pct);
    }
}
