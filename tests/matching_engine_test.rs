//! Scenarios modeled on spec.md §8 S1/S2, exercised through the public
//! `matching` module.

use chrono::{TimeZone, Utc};
use market_aggregator::matching::cluster_markets;
use market_aggregator::types::{Category, NormalizedMarket, Outcome, Venue};

fn market(venue: Venue, id: &str, question: &str, yes: f64, no: f64, volume: f64) -> NormalizedMarket {
    NormalizedMarket {
        id: id.to_string(),
        venue,
        question: question.to_string(),
        outcomes: vec![
            Outcome { name: "Yes".into(), price: yes, rank: 0, image: None },
            Outcome { name: "No".into(), price: no, rank: 1, image: None },
        ],
        volume_24h: volume,
        liquidity: 10_000.0,
        spread: (1.0 - (yes + no)).abs(),
        end_date: Utc.with_ymd_and_hms(2024, 11, 6, 0, 0, 0).single(),
        category: Category::Politics,
        closed: false,
        resolved: false,
        last_update: Utc::now(),
    }
}

#[test]
fn s1_near_duplicate_clusters_across_venues() {
    let markets = vec![
        market(Venue::VenueA, "a1", "Will Donald Trump win the 2024 Presidential Election?", 0.52, 0.48, 1_500_000.0),
        market(Venue::VenueB, "b1", "Will Trump win the 2024 Presidential Election?", 0.53, 0.47, 800_000.0),
    ];

    let clusters = cluster_markets(markets);

    assert_eq!(clusters.len(), 1);
    let um = &clusters[0];
    assert_eq!(um.members.len(), 2);
    assert!(um.members.contains_key(&Venue::VenueA));
    assert!(um.members.contains_key(&Venue::VenueB));
    assert!(um.match_confidence >= 0.85);
    // combined_volume is computed by Aggregator::enhance, not clustering itself.
    assert!((um.combined_volume - 0.0).abs() < f64::EPSILON);
}

#[test]
fn s1b_identical_question_scores_near_one() {
    let markets = vec![
        market(Venue::VenueA, "a1", "Will Bitcoin exceed $100,000 by end of year?", 0.6, 0.4, 500_000.0),
        market(Venue::VenueB, "b1", "Will Bitcoin exceed $100,000 by end of year?", 0.58, 0.42, 400_000.0),
    ];

    let clusters = cluster_markets(markets);

    assert_eq!(clusters.len(), 1);
    assert!(clusters[0].match_confidence >= 0.95);
}

#[test]
fn s2_rejected_near_match() {
    let markets = vec![
        market(Venue::VenueA, "a1", "Will Donald Trump win the 2024 US Presidential Election?", 0.52, 0.48, 1_500_000.0),
        market(Venue::VenueB, "b1", "Will Joe Biden win the 2024 US Presidential Election?", 0.40, 0.60, 800_000.0),
    ];

    let clusters = cluster_markets(markets);

    assert_eq!(clusters.len(), 2);
    assert!(clusters.iter().all(|c| c.members.len() == 1));
}
