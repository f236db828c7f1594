use crate::core::error::ConfigError;
use crate::core::rates::{RatePair, is_valid_code};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

/// Environment variable that overrides the ExchangeRate-API key.
pub const API_KEY_ENV: &str = "EXCHANGERATE_API_KEY";

pub const RATES_FILE_NAME: &str = "rates.json";
pub const HISTORY_FILE_NAME: &str = "exchange_rates.json";

fn codes(list: &[&str]) -> Vec<String> {
    list.iter().map(|c| c.to_string()).collect()
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RetrySettings {
    pub max_attempts: usize,
    pub retry_delay_ms: u64,
}

impl RetrySettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CoinGeckoConfig {
    pub base_url: String,
    pub retry: RetrySettings,
}

impl Default for CoinGeckoConfig {
    fn default() -> Self {
        CoinGeckoConfig {
            base_url: "https://api.coingecko.com/api/v3".to_string(),
            retry: RetrySettings {
                max_attempts: 3,
                retry_delay_ms: 1000,
            },
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ExchangeRateConfig {
    pub base_url: String,
    pub api_key: String,
    pub retry: RetrySettings,
}

impl Default for ExchangeRateConfig {
    fn default() -> Self {
        ExchangeRateConfig {
            base_url: "https://v6.exchangerate-api.com/v6".to_string(),
            api_key: String::new(),
            retry: RetrySettings {
                max_attempts: 2,
                retry_delay_ms: 2000,
            },
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct ProvidersConfig {
    pub coingecko: CoinGeckoConfig,
    pub exchangerate: ExchangeRateConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub base_currency: String,
    pub fiat_currencies: Vec<String>,
    pub crypto_currencies: Vec<String>,
    pub crypto_ids: BTreeMap<String, String>,
    pub providers: ProvidersConfig,
    pub request_timeout_secs: u64,
    pub update_interval_secs: u64,
    pub cache_ttl_secs: u64,
    pub data_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let crypto_ids = [
            ("BTC", "bitcoin"),
            ("ETH", "ethereum"),
            ("SOL", "solana"),
            ("BNB", "binancecoin"),
            ("XRP", "ripple"),
            ("ADA", "cardano"),
            ("DOGE", "dogecoin"),
            ("DOT", "polkadot"),
            ("AVAX", "avalanche-2"),
        ]
        .into_iter()
        .map(|(code, id)| (code.to_string(), id.to_string()))
        .collect();

        AppConfig {
            base_currency: "USD".to_string(),
            fiat_currencies: codes(&[
                "EUR", "GBP", "JPY", "CNY", "RUB", "CHF", "CAD", "AUD", "NZD",
            ]),
            crypto_currencies: codes(&[
                "BTC", "ETH", "SOL", "BNB", "XRP", "ADA", "DOGE", "DOT", "AVAX",
            ]),
            crypto_ids,
            providers: ProvidersConfig::default(),
            request_timeout_secs: 10,
            update_interval_secs: 300,
            cache_ttl_secs: 600,
            data_path: None,
        }
    }
}

impl AppConfig {
    /// Loads the config from the default location, or the built-in defaults
    /// when no config file has been created yet.
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::from_defaults()?);
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "ratehub", "ratehub")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        let config = config
            .finalize()
            .with_context(|| format!("Invalid config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn from_defaults() -> Result<Self, ConfigError> {
        Self::default().finalize()
    }

    /// Normalises codes, applies the environment key override and validates
    /// that every tracked crypto currency has a provider id.
    pub fn finalize(self) -> Result<Self, ConfigError> {
        self.apply_api_key_override(std::env::var(API_KEY_ENV).ok())
            .normalized()
            .validated()
    }

    pub fn apply_api_key_override(mut self, key: Option<String>) -> Self {
        if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
            debug!("Using ExchangeRate-API key from {}", API_KEY_ENV);
            self.providers.exchangerate.api_key = key.trim().to_string();
        }
        self
    }

    fn normalized(mut self) -> Self {
        let upper = |codes: Vec<String>| -> Vec<String> {
            let mut out: Vec<String> = Vec::with_capacity(codes.len());
            for code in codes.into_iter().map(|c| c.trim().to_uppercase()) {
                if !out.contains(&code) {
                    out.push(code);
                }
            }
            out
        };
        self.base_currency = self.base_currency.trim().to_uppercase();
        self.fiat_currencies = upper(self.fiat_currencies);
        self.crypto_currencies = upper(self.crypto_currencies);
        self.crypto_ids = self
            .crypto_ids
            .into_iter()
            .map(|(code, id)| (code.trim().to_uppercase(), id))
            .collect();
        self
    }

    fn validated(self) -> Result<Self, ConfigError> {
        let all_codes = std::iter::once(&self.base_currency)
            .chain(&self.fiat_currencies)
            .chain(&self.crypto_currencies);
        for code in all_codes {
            if !is_valid_code(code) {
                return Err(ConfigError::InvalidCode(code.clone()));
            }
        }
        for crypto in &self.crypto_currencies {
            if !self.crypto_ids.contains_key(crypto) {
                return Err(ConfigError::MissingProviderId(crypto.clone()));
            }
        }
        if self.update_interval_secs == 0 {
            return Err(ConfigError::ZeroDuration("update_interval_secs"));
        }
        Ok(self)
    }

    pub fn crypto_id(&self, code: &str) -> Result<&str, ConfigError> {
        self.crypto_ids
            .get(&code.to_uppercase())
            .map(String::as_str)
            .ok_or_else(|| ConfigError::UnknownCode(code.to_string()))
    }

    pub fn coingecko_request_url(&self) -> String {
        let ids: Vec<&str> = self
            .crypto_currencies
            .iter()
            .filter_map(|code| self.crypto_ids.get(code).map(String::as_str))
            .collect();
        format!(
            "{}/simple/price?ids={}&vs_currencies={}",
            self.providers.coingecko.base_url.trim_end_matches('/'),
            ids.join(","),
            self.base_currency.to_lowercase()
        )
    }

    pub fn exchangerate_request_url(&self) -> String {
        format!(
            "{}/{}/latest/{}",
            self.providers.exchangerate.base_url.trim_end_matches('/'),
            self.providers.exchangerate.api_key,
            self.base_currency
        )
    }

    /// Every pair the pipeline tracks against the base currency, with a
    /// short description.
    pub fn tracked_pairs(&self) -> Vec<(RatePair, String)> {
        let base = &self.base_currency;
        let crypto = self.crypto_currencies.iter().map(|code| {
            (
                RatePair::new(code, base),
                format!("Crypto currency {code} to {base}"),
            )
        });
        let fiat = self
            .fiat_currencies
            .iter()
            .filter(|code| *code != base)
            .map(|code| {
                (
                    RatePair::new(code, base),
                    format!("Fiat currency {code} to {base}"),
                )
            });
        crypto.chain(fiat).collect()
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("io", "ratehub", "ratehub")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn rates_file_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(RATES_FILE_NAME))
    }

    pub fn history_file_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(HISTORY_FILE_NAME))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}
