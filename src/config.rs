//! Environment configuration, following the teacher's `Config::from_env`
//! idiom: every field has a sane default, and `validate()` rejects
//! impossible combinations before the server starts listening.

use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchStrategy {
    Minimal,
    Smart,
    Full,
}

impl FetchStrategy {
    pub fn max_pages(&self) -> usize {
        match self {
            FetchStrategy::Minimal => 1,
            FetchStrategy::Smart => 2,
            FetchStrategy::Full => 50,
        }
    }

    fn from_env_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "minimal" => FetchStrategy::Minimal,
            "full" => FetchStrategy::Full,
            _ => FetchStrategy::Smart,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheTtlConfig {
    pub metadata_ms: u64,
    pub full_ms: u64,
    pub unified_ms: u64,
    pub match_confidence_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    pub venue_a_interval_secs: u64,
    pub venue_b_interval_secs: u64,
    pub stale_after_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub venue_b_api_key: Option<String>,
    pub cache_ttl: CacheTtlConfig,
    pub poller: PollerConfig,
    pub fetch_strategy: FetchStrategy,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: env::var("SERVER_PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidPort)?,
                log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            },
            venue_b_api_key: env::var("VENUE_B_API_KEY").ok(),
            cache_ttl: CacheTtlConfig {
                metadata_ms: env::var("CACHE_TTL_METADATA_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10 * 60 * 1000),
                full_ms: env::var("CACHE_TTL_FULL_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5 * 60 * 1000),
                unified_ms: env::var("CACHE_TTL_UNIFIED_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5 * 60 * 1000),
                match_confidence_ms: env::var("CACHE_TTL_MATCH_CONFIDENCE_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10 * 60 * 1000),
            },
            poller: PollerConfig {
                venue_a_interval_secs: env::var("POLLER_VENUE_A_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5),
                venue_b_interval_secs: env::var("POLLER_VENUE_B_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10),
                stale_after_secs: 60,
            },
            fetch_strategy: env::var("FETCH_STRATEGY")
                .map(|s| FetchStrategy::from_env_str(&s))
                .unwrap_or(FetchStrategy::Smart),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.poller.venue_a_interval_secs == 0 || self.poller.venue_b_interval_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "poller intervals must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid port number")]
    InvalidPort,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_strategy_max_pages() {
        assert_eq!(FetchStrategy::Minimal.max_pages(), 1);
        assert_eq!(FetchStrategy::Smart.max_pages(), 2);
        assert_eq!(FetchStrategy::Full.max_pages(), 50);
    }

    #[test]
    fn rejects_zero_port() {
        let mut cfg = Config::from_env().unwrap();
        cfg.server.port = 0;
        assert!(cfg.validate().is_err());
    }
}
