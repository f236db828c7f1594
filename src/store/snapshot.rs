use super::atomic::write_json_atomic;
use super::history::HistoryLog;
use crate::core::config::AppConfig;
use crate::core::error::PersistenceError;
use crate::core::rates::{HistoryEntry, RateMap, RatePair, RateRecord, Snapshot};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// File-backed rate cache: one snapshot of the current rates plus the
/// bounded history log.
pub struct RateCache {
    snapshot_path: PathBuf,
    history: HistoryLog,
    ttl: Duration,
}

impl RateCache {
    pub fn new(
        snapshot_path: impl Into<PathBuf>,
        history_path: impl Into<PathBuf>,
        ttl: Duration,
    ) -> Self {
        RateCache {
            snapshot_path: snapshot_path.into(),
            history: HistoryLog::new(history_path),
            ttl,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self::new(
            config.rates_file_path()?,
            config.history_file_path()?,
            config.cache_ttl(),
        ))
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn save_snapshot(
        &self,
        rates: &RateMap,
        source: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<(), PersistenceError> {
        let snapshot = build_snapshot(rates, source, metadata, Utc::now());
        write_json_atomic(&self.snapshot_path, &snapshot)?;
        info!(
            "Saved {} rates to {}",
            rates.len(),
            self.snapshot_path.display()
        );
        Ok(())
    }

    pub fn append_history(
        &self,
        rates: &RateMap,
        source: &str,
        meta: Option<serde_json::Value>,
    ) -> Result<(), PersistenceError> {
        self.history.append(rates, source, meta)
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history.load()
    }

    /// Returns the current snapshot, or `None` when there is none or it
    /// cannot be read.
    pub fn load_snapshot(&self) -> Option<Snapshot> {
        let contents = match fs::read_to_string(&self.snapshot_path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No rate snapshot at {}", self.snapshot_path.display());
                return None;
            }
            Err(e) => {
                warn!(path = %self.snapshot_path.display(), error = %e, "Failed to read rate snapshot");
                return None;
            }
        };
        match serde_json::from_str(&contents) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(path = %self.snapshot_path.display(), error = %e, "Failed to parse rate snapshot");
                None
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.load_snapshot()
            .is_some_and(|snapshot| is_fresh(&snapshot, self.ttl, now))
    }

    /// Looks up `from -> to`, falling back to the inverted reverse pair.
    pub fn get_rate(&self, from: &str, to: &str) -> Option<f64> {
        let snapshot = self.load_snapshot()?;
        lookup(&snapshot, &RatePair::new(from, to))
    }

    /// Removes the snapshot file. Returns whether a file was removed.
    pub fn clear(&self) -> Result<bool, PersistenceError> {
        match fs::remove_file(&self.snapshot_path) {
            Ok(()) => {
                info!("Rate cache cleared");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(PersistenceError::io(&self.snapshot_path, e)),
        }
    }
}

fn build_snapshot(
    rates: &RateMap,
    source: &str,
    metadata: Option<serde_json::Value>,
    now: DateTime<Utc>,
) -> Snapshot {
    let pairs = rates
        .iter()
        .map(|(pair, rate)| {
            (
                pair.clone(),
                RateRecord {
                    rate: *rate,
                    updated_at: now,
                    source: source.to_string(),
                },
            )
        })
        .collect();
    Snapshot {
        last_refresh: now,
        source: source.to_string(),
        pairs,
        metadata,
    }
}

pub fn is_fresh(snapshot: &Snapshot, ttl: Duration, now: DateTime<Utc>) -> bool {
    let Ok(ttl) = chrono::Duration::from_std(ttl) else {
        return true;
    };
    now.signed_duration_since(snapshot.last_refresh) < ttl
}

pub fn lookup(snapshot: &Snapshot, pair: &RatePair) -> Option<f64> {
    if let Some(rate) = snapshot.rate(pair) {
        return Some(rate);
    }
    match snapshot.rate(&pair.reversed()) {
        Some(rate) if rate != 0.0 => Some(1.0 / rate),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::atomic::stage_json;
    use tempfile::{TempDir, tempdir};

    fn cache_in(dir: &TempDir) -> RateCache {
        RateCache::new(
            dir.path().join("rates.json"),
            dir.path().join("exchange_rates.json"),
            Duration::from_secs(600),
        )
    }

    fn sample_rates() -> RateMap {
        RateMap::from([
            (RatePair::new("BTC", "USD"), 65000.5),
            (RatePair::new("EUR", "USD"), 1.0834),
            (RatePair::new("USD", "JPY"), 151.2),
        ])
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = tempdir().unwrap();
        let cache = cache_in(&dir);

        cache
            .save_snapshot(
                &sample_rates(),
                "ParserService",
                Some(serde_json::json!({"request_count": 2})),
            )
            .unwrap();

        let snapshot = cache.load_snapshot().unwrap();
        assert_eq!(snapshot.source, "ParserService");
        assert_eq!(snapshot.pairs.len(), 3);
        for (pair, rate) in sample_rates() {
            let record = &snapshot.pairs[&pair];
            assert_eq!(record.rate, rate);
            assert_eq!(record.updated_at, snapshot.last_refresh);
        }
        assert_eq!(snapshot.metadata.unwrap()["request_count"], 2);
    }

    #[test]
    fn test_snapshot_file_layout() {
        let dir = tempdir().unwrap();
        let cache = cache_in(&dir);
        cache.save_snapshot(&sample_rates(), "ParserService", None).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(cache.snapshot_path()).unwrap()).unwrap();
        assert!(raw["last_refresh"].is_string());
        assert_eq!(raw["pairs"]["BTC_USD"]["rate"], 65000.5);
        assert_eq!(raw["pairs"]["BTC_USD"]["source"], "ParserService");
        assert!(raw.get("metadata").is_none());
    }

    #[test]
    fn test_missing_or_corrupt_snapshot_is_none() {
        let dir = tempdir().unwrap();
        let cache = cache_in(&dir);
        assert!(cache.load_snapshot().is_none());
        assert!(!cache.is_valid());
        assert!(cache.get_rate("BTC", "USD").is_none());

        fs::write(cache.snapshot_path(), "{\"last_refresh\": 12").unwrap();
        assert!(cache.load_snapshot().is_none());
        assert!(!cache.is_valid());
    }

    #[test]
    fn test_ttl_boundary() {
        let dir = tempdir().unwrap();
        let cache = cache_in(&dir);
        cache.save_snapshot(&sample_rates(), "test", None).unwrap();
        let refreshed = cache.load_snapshot().unwrap().last_refresh;

        let ttl = chrono::Duration::seconds(600);
        let one_second = chrono::Duration::seconds(1);
        assert!(cache.is_valid_at(refreshed + ttl - one_second));
        assert!(!cache.is_valid_at(refreshed + ttl + one_second));
        assert!(cache.is_valid());
    }

    #[test]
    fn test_get_rate_direct_and_inverse() {
        let dir = tempdir().unwrap();
        let cache = cache_in(&dir);
        cache.save_snapshot(&sample_rates(), "test", None).unwrap();

        assert_eq!(cache.get_rate("BTC", "USD"), Some(65000.5));
        assert_eq!(cache.get_rate("usd", "btc"), Some(1.0 / 65000.5));
        assert_eq!(cache.get_rate("JPY", "USD"), Some(1.0 / 151.2));
        assert_eq!(cache.get_rate("BTC", "EUR"), None);
    }

    #[test]
    fn test_get_rate_zero_reverse_is_none() {
        let dir = tempdir().unwrap();
        let cache = cache_in(&dir);
        let rates = RateMap::from([(RatePair::new("XYZ", "USD"), 0.0)]);
        cache.save_snapshot(&rates, "test", None).unwrap();

        assert_eq!(cache.get_rate("XYZ", "USD"), Some(0.0));
        assert_eq!(cache.get_rate("USD", "XYZ"), None);
    }

    #[test]
    fn test_interrupted_write_keeps_previous_snapshot() {
        let dir = tempdir().unwrap();
        let cache = cache_in(&dir);
        cache.save_snapshot(&sample_rates(), "first", None).unwrap();
        let before = fs::read_to_string(cache.snapshot_path()).unwrap();

        // Stage a replacement and abandon it before the rename.
        let replacement = build_snapshot(
            &RateMap::from([(RatePair::new("BTC", "USD"), 1.0)]),
            "second",
            None,
            Utc::now(),
        );
        let staged = stage_json(cache.snapshot_path(), &replacement).unwrap();
        drop(staged);

        assert_eq!(fs::read_to_string(cache.snapshot_path()).unwrap(), before);
        let snapshot = cache.load_snapshot().unwrap();
        assert_eq!(snapshot.source, "first");
        assert_eq!(cache.get_rate("BTC", "USD"), Some(65000.5));
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = tempdir().unwrap();
        let cache = cache_in(&dir);
        cache.save_snapshot(&sample_rates(), "test", None).unwrap();

        assert!(cache.clear().unwrap());
        assert!(!cache.clear().unwrap());
        assert!(cache.load_snapshot().is_none());
    }

    #[test]
    fn test_append_history_goes_to_history_file() {
        let dir = tempdir().unwrap();
        let cache = cache_in(&dir);
        cache.append_history(&sample_rates(), "test", None).unwrap();

        assert_eq!(cache.history().len(), 3);
        assert!(cache.load_snapshot().is_none());
    }
}
