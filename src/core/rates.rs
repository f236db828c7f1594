//! Rate pairs and the records persisted for them

use crate::core::error::ConfigError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

pub const PAIR_SEPARATOR: char = '_';

/// Ordered currency pair. `BTC_USD` is the value of one BTC in USD.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RatePair {
    from: String,
    to: String,
}

impl RatePair {
    pub fn new(from: &str, to: &str) -> Self {
        RatePair {
            from: from.trim().to_uppercase(),
            to: to.trim().to_uppercase(),
        }
    }

    pub fn from_currency(&self) -> &str {
        &self.from
    }

    pub fn to_currency(&self) -> &str {
        &self.to
    }

    pub fn reversed(&self) -> Self {
        RatePair {
            from: self.to.clone(),
            to: self.from.clone(),
        }
    }
}

/// Checks that a currency code is non-empty uppercase ASCII alphanumeric.
pub fn is_valid_code(code: &str) -> bool {
    !code.is_empty()
        && code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

impl Display for RatePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.from, PAIR_SEPARATOR, self.to)
    }
}

impl FromStr for RatePair {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(PAIR_SEPARATOR);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(from), Some(to), None) if is_valid_code(from) && is_valid_code(to) => {
                Ok(RatePair {
                    from: from.to_string(),
                    to: to.to_string(),
                })
            }
            _ => Err(ConfigError::InvalidCode(s.to_string())),
        }
    }
}

impl Serialize for RatePair {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RatePair {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Pair to rate, as produced by one fetch or by a merged update run.
pub type RateMap = BTreeMap<RatePair, f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRecord {
    pub rate: f64,
    pub updated_at: DateTime<Utc>,
    pub source: String,
}

/// The current set of known rates, replaced wholesale on every update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub last_refresh: DateTime<Utc>,
    pub source: String,
    pub pairs: BTreeMap<RatePair, RateRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Snapshot {
    pub fn rate(&self, pair: &RatePair) -> Option<f64> {
        self.pairs.get(pair).map(|record| record.rate)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub from_currency: String,
    pub to_currency: String,
    pub rate: f64,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    #[serde(default)]
    pub meta: serde_json::Value,
}

impl HistoryEntry {
    pub fn new(
        pair: &RatePair,
        rate: f64,
        timestamp: DateTime<Utc>,
        source: &str,
        meta: serde_json::Value,
    ) -> Self {
        HistoryEntry {
            id: format!("{}_{}", pair, timestamp.format("%Y%m%d_%H%M%S")),
            from_currency: pair.from_currency().to_string(),
            to_currency: pair.to_currency().to_string(),
            rate,
            timestamp,
            source: source.to_string(),
            meta,
        }
    }
}
