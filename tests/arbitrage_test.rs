//! Scenarios modeled on spec.md §8 S3/S4, exercised through the public
//! `aggregator`/`arbitrage` modules end to end (cluster -> enhance -> detect).

use chrono::Utc;
use market_aggregator::aggregator::Aggregator;
use market_aggregator::types::{Category, NormalizedMarket, Outcome, UnifiedMarket, Venue};
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
        volume_24h: 1_000.0,
        liquidity: 10_000.0,
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
        best_price: market_aggregator::types::BestPrice { yes: None, no: None },
        liquidity_score: 1,
        arbitrage: None,
        routing_recommendations: Default::default(),
        criteria_mismatch: false,
    }
}

#[test]
fn s3_arbitrage_detected_with_expected_venues_and_total() {
    let um = cluster(vec![member(Venue::VenueA, 0.40, 0.60), member(Venue::VenueB, 0.45, 0.50)]);
    let enhanced = Aggregator::enhance(um);

    let arb = enhanced.arbitrage.expect("expected arbitrage opportunity");
    assert!(arb.exists);
    assert_eq!(arb.yes_buy.venue, Venue::VenueA);
    assert!((arb.yes_buy.price - 0.40).abs() < 1e-9);
    assert_eq!(arb.no_sell.venue, Venue::VenueB);
    assert!((arb.no_sell.price - 0.50).abs() < 1e-9);
    assert!((arb.total_cost - 0.90).abs() < 1e-9);
    assert!((arb.profit_pct - 11.111_111_111).abs() < 1e-6);

    let instructions = market_aggregator::arbitrage::generate_instructions(&arb);
    assert_eq!(instructions.steps.len(), 3);
    assert!(instructions.steps[0].contains("venue_a"));
    assert!(instructions.steps[1].contains("venue_b"));
}

#[test]
fn s4_arbitrage_rejected_below_threshold() {
    let um = cluster(vec![member(Venue::VenueA, 0.48, 0.52), member(Venue::VenueB, 0.49, 0.50)]);
    let enhanced = Aggregator::enhance(um);
    assert!(enhanced.arbitrage.is_none());
}
