//! Per-chain aging configuration.

use crate::decimal;
use crate::ChainId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Aging thresholds as reported by the contract, all in days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgingThresholds {
    #[serde(with = "decimal")]
    pub dirt_level1_days: u64,
    #[serde(with = "decimal")]
    pub dirt_level2_days: u64,
    #[serde(with = "decimal")]
    pub aging_advance_days: u64,
    #[serde(with = "decimal")]
    pub free_clean_days: u64,
    #[serde(with = "decimal")]
    pub free_clean_window: u64,
}

/// Thresholds for one chain plus when they were read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    #[serde(flatten)]
    pub thresholds: AgingThresholds,
    #[serde(with = "decimal")]
    pub chain_id: ChainId,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub fetched_at: DateTime<Utc>,
}

impl ChainConfig {
    pub fn new(chain_id: ChainId, thresholds: AgingThresholds, fetched_at: DateTime<Utc>) -> Self {
        Self {
            thresholds,
            chain_id,
            fetched_at,
        }
    }

    /// Whether `now` is still inside the freshness window.
    ///
    /// A `fetched_at` in the future (clock skew between writers) counts as fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let age = now.signed_duration_since(self.fetched_at);
        match age.to_std() {
            Ok(age) => age < ttl,
            Err(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> AgingThresholds {
        AgingThresholds {
            dirt_level1_days: 7,
            dirt_level2_days: 14,
            aging_advance_days: 30,
            free_clean_days: 30,
            free_clean_window: 11,
        }
    }

    #[test]
    fn test_freshness_window() {
        let fetched = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let config = ChainConfig::new(84532, thresholds(), fetched);
        let ttl = Duration::from_secs(86_400);

        assert!(config.is_fresh(fetched, ttl));
        assert!(config.is_fresh(fetched + chrono::Duration::seconds(86_399), ttl));
        assert!(!config.is_fresh(fetched + chrono::Duration::seconds(86_400), ttl));
        assert!(config.is_fresh(fetched - chrono::Duration::seconds(60), ttl));
    }

    #[test]
    fn test_persisted_shape() {
        let fetched = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        let config = ChainConfig::new(84532, thresholds(), fetched);
        let json = serde_json::to_value(config).unwrap();

        assert_eq!(json["dirtLevel1Days"], "7");
        assert_eq!(json["agingAdvanceDays"], "30");
        assert_eq!(json["chainId"], "84532");
        assert_eq!(json["fetchedAt"], 1_700_000_000_123_i64);

        let back: ChainConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }
}
