//! Cross-venue prediction-market aggregator.
//!
//! Pulls normalized markets from two venue adapters, clusters matching
//! questions into unified markets, detects riskless cross-venue arbitrage,
//! and serves the result over a read-only HTTP API. See `DESIGN.md` for
//! the grounding of each module.

pub mod aggregator;
pub mod arbitrage;
pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod matching;
pub mod poller;
pub mod types;
pub mod venue;
