use super::atomic::write_json_atomic;
use crate::core::error::PersistenceError;
use crate::core::rates::{HistoryEntry, RateMap};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const HISTORY_LIMIT: usize = 1000;

/// Append-only log of observed rates, capped to the most recent entries.
pub struct HistoryLog {
    path: PathBuf,
    limit: usize,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        HistoryLog {
            path: path.into(),
            limit: HISTORY_LIMIT,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored entries, oldest first. A missing or unreadable file
    /// counts as an empty history.
    pub fn load(&self) -> Vec<HistoryEntry> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read rate history");
                return Vec::new();
            }
        };
        serde_json::from_str(&contents).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "Failed to parse rate history");
            Vec::new()
        })
    }

    pub fn append(
        &self,
        rates: &RateMap,
        source: &str,
        meta: Option<serde_json::Value>,
    ) -> Result<(), PersistenceError> {
        let timestamp = Utc::now();
        let meta = meta.unwrap_or_else(|| serde_json::json!({}));

        let mut history = self.load();
        history.extend(rates.iter().map(|(pair, rate)| {
            HistoryEntry::new(pair, *rate, timestamp, source, meta.clone())
        }));
        if history.len() > self.limit {
            let excess = history.len() - self.limit;
            history.drain(..excess);
        }

        write_json_atomic(&self.path, &history)?;
        info!("Added {} entries to rate history", rates.len());
        Ok(())
    }
}
