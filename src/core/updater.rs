//! Fans out to the rate sources, merges their results and writes them
//! through to the cache.

use crate::core::config::AppConfig;
use crate::core::error::ConfigError;
use crate::core::rates::RateMap;
use crate::core::source::RateSource;
use crate::providers::{default_sources, util::with_logging};
use crate::store::RateCache;
use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Source name recorded in the snapshot and history files.
pub const CACHE_SOURCE: &str = "ParserService";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Error,
}

impl Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Success => write!(f, "success"),
            RunStatus::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceReport {
    pub name: String,
    pub rates_count: usize,
    pub elapsed: Duration,
    pub status: RunStatus,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpdateResult {
    pub started_at: DateTime<Utc>,
    /// One report per source, in merge order.
    pub per_source: Vec<SourceReport>,
    pub total_rates: usize,
    pub errors: Vec<String>,
    pub status: RunStatus,
    pub total_time: Duration,
}

impl UpdateResult {
    pub fn source(&self, name: &str) -> Option<&SourceReport> {
        self.per_source.iter().find(|report| report.name == name)
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RatesStatus {
    pub available: bool,
    pub message: String,
    pub last_refresh: Option<DateTime<Utc>>,
    pub rates_count: usize,
}

pub struct RatesUpdater {
    sources: Vec<Arc<dyn RateSource>>,
    cache: Arc<RateCache>,
}

impl RatesUpdater {
    pub fn new(sources: Vec<Arc<dyn RateSource>>, cache: Arc<RateCache>) -> Self {
        info!(sources = sources.len(), "Rates updater initialised");
        RatesUpdater { sources, cache }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        info!(
            "Tracking {} crypto and {} fiat currencies against {}",
            config.crypto_currencies.len(),
            config.fiat_currencies.len(),
            config.base_currency
        );
        Ok(Self::new(
            default_sources(config)?,
            Arc::new(RateCache::from_config(config)?),
        ))
    }

    pub fn cache(&self) -> &Arc<RateCache> {
        &self.cache
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    pub(crate) fn select_sources(
        &self,
        source: Option<&str>,
    ) -> Result<Vec<Arc<dyn RateSource>>, ConfigError> {
        match source {
            None => Ok(self.sources.clone()),
            Some(name) => self
                .sources
                .iter()
                .find(|s| s.name() == name)
                .map(|s| vec![Arc::clone(s)])
                .ok_or_else(|| ConfigError::UnknownSource {
                    name: name.to_string(),
                    available: self.source_names(),
                }),
        }
    }

    /// Runs one update across `source`, or every source when `None`.
    ///
    /// A failing source is recorded and does not stop the others. The cache
    /// is only written when at least one rate was received.
    pub async fn update_rates(&self, source: Option<&str>) -> Result<UpdateResult, ConfigError> {
        match source {
            Some(name) => info!("Starting rates update from source: {name}"),
            None => info!("Starting rates update"),
        }
        let started = Instant::now();
        let started_at = Utc::now();
        let selected = self.select_sources(source)?;

        let outcomes = join_all(selected.iter().map(|source| {
            with_logging(source.name(), async move { source.fetch_rates().await })
        }))
        .await;

        let mut merged = RateMap::new();
        let mut per_source = Vec::with_capacity(selected.len());
        let mut errors = Vec::new();
        for (source, (outcome, elapsed)) in selected.iter().zip(outcomes) {
            let name = source.name().to_string();
            match outcome {
                Ok(rates) => {
                    info!(
                        "Received {} rates from {} in {:.2}s",
                        rates.len(),
                        name,
                        elapsed.as_secs_f64()
                    );
                    per_source.push(SourceReport {
                        name,
                        rates_count: rates.len(),
                        elapsed,
                        status: RunStatus::Success,
                        error: None,
                    });
                    merged.extend(rates);
                }
                Err(e) => {
                    let message = format!("Failed to fetch rates from {name}: {e}");
                    error!("{message}");
                    per_source.push(SourceReport {
                        name,
                        rates_count: 0,
                        elapsed,
                        status: RunStatus::Error,
                        error: Some(e.to_string()),
                    });
                    errors.push(message);
                }
            }
        }

        let names: Vec<&str> = selected.iter().map(|s| s.name()).collect();
        let (status, total_rates) = if merged.is_empty() {
            let message = "No rates received from any source".to_string();
            error!("{message}");
            errors.push(message);
            (RunStatus::Error, 0)
        } else {
            match self.persist(&merged, &names, started) {
                Ok(()) => {
                    info!(
                        "Updated {} rates in {:.2}s",
                        merged.len(),
                        started.elapsed().as_secs_f64()
                    );
                    (RunStatus::Success, merged.len())
                }
                Err(message) => {
                    error!("{message}");
                    errors.push(message);
                    (RunStatus::Error, merged.len())
                }
            }
        };

        Ok(UpdateResult {
            started_at,
            per_source,
            total_rates,
            errors,
            status,
            total_time: started.elapsed(),
        })
    }

    fn persist(&self, rates: &RateMap, names: &[&str], started: Instant) -> Result<(), String> {
        self.cache
            .save_snapshot(
                rates,
                CACHE_SOURCE,
                Some(serde_json::json!({
                    "sources": names,
                    "request_count": names.len(),
                })),
            )
            .map_err(|e| format!("Failed to save rates: {e}"))?;
        self.cache
            .append_history(
                rates,
                CACHE_SOURCE,
                Some(serde_json::json!({
                    "clients": names,
                    "total_time": round2(started.elapsed().as_secs_f64()),
                })),
            )
            .map_err(|e| format!("Failed to save rate history: {e}"))
    }

    /// Renders a human readable report of one update run.
    pub fn get_update_summary(result: &UpdateResult) -> String {
        let headline = match (result.status, result.total_rates) {
            (RunStatus::Success, _) => "Rates update completed successfully",
            (RunStatus::Error, 0) => "Rates update failed. No rates were received.",
            (RunStatus::Error, _) => "Rates update completed with errors",
        };
        let mut lines = vec![
            headline.to_string(),
            format!("Total rates: {}", result.total_rates),
            format!("Total time: {:.2}s", result.total_time.as_secs_f64()),
        ];

        lines.extend(result.per_source.iter().map(|report| match report.status {
            RunStatus::Success => format!(
                "  + {}: {} rates in {:.2}s",
                report.name,
                report.rates_count,
                report.elapsed.as_secs_f64()
            ),
            RunStatus::Error => format!(
                "  - {}: ERROR - {}",
                report.name,
                report.error.as_deref().unwrap_or("unknown error")
            ),
        }));

        if !result.errors.is_empty() {
            lines.push(String::new());
            lines.push("Errors:".to_string());
            lines.extend(
                result
                    .errors
                    .iter()
                    .enumerate()
                    .map(|(i, error)| format!("  {}. {}", i + 1, error)),
            );
        }

        if result.status == RunStatus::Error {
            lines.push(String::new());
            lines.push(
                "Cached rates were left unchanged. \
                 Run `ratehub update-rates --force` to force a refresh."
                    .to_string(),
            );
        }

        lines.join("\n")
    }

    pub fn check_rates_available(&self) -> RatesStatus {
        let Some(snapshot) = self.cache.load_snapshot() else {
            return RatesStatus {
                available: false,
                message: "Rate cache is empty".to_string(),
                last_refresh: None,
                rates_count: 0,
            };
        };

        let available = self.cache.is_valid();
        RatesStatus {
            available,
            message: if available {
                "Rate cache is up to date".to_string()
            } else {
                "Rate cache is stale".to_string()
            },
            last_refresh: Some(snapshot.last_refresh),
            rates_count: snapshot.pairs.len(),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
