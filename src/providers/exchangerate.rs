use super::util::{RetryPolicy, build_client, get_json, redact, with_retry};
use crate::core::config::AppConfig;
use crate::core::error::FetchError;
use crate::core::rates::{RateMap, RatePair};
use crate::core::source::RateSource;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

pub const SOURCE_NAME: &str = "exchangerate";

#[derive(Debug, Deserialize)]
struct LatestRatesResponse {
    result: String,
    #[serde(rename = "error-type")]
    error_type: Option<String>,
    base_code: Option<String>,
    #[serde(default, alias = "conversion_rates")]
    rates: HashMap<String, f64>,
}

/// Fiat rates from ExchangeRate-API `latest/{BASE}`. Each quote is stored
/// together with its inverse.
pub struct ExchangeRateProvider {
    url: String,
    api_key: String,
    base_currency: String,
    fiat_currencies: Vec<String>,
    client: reqwest::Client,
    timeout: Duration,
    retry: RetryPolicy,
}

impl ExchangeRateProvider {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let settings = &config.providers.exchangerate;
        if settings.api_key.is_empty() {
            warn!(
                "No ExchangeRate-API key configured, set providers.exchangerate.api_key or {}",
                crate::core::config::API_KEY_ENV
            );
        }

        Ok(ExchangeRateProvider {
            url: config.exchangerate_request_url(),
            api_key: settings.api_key.clone(),
            base_currency: config.base_currency.clone(),
            fiat_currencies: config.fiat_currencies.clone(),
            client: build_client(config.request_timeout())
                .context("Failed to build ExchangeRate-API HTTP client")?,
            timeout: config.request_timeout(),
            retry: RetryPolicy::new(settings.retry.max_attempts, settings.retry.retry_delay()),
        })
    }

    async fn fetch_once(&self) -> Result<RateMap, FetchError> {
        debug!(
            "Requesting fiat rates from {}",
            redact(&self.url, &self.api_key)
        );
        let data: LatestRatesResponse = get_json(&self.client, &self.url, self.timeout).await?;

        if data.result != "success" {
            return Err(FetchError::Rejected(
                data.error_type.unwrap_or_else(|| "unknown".to_string()),
            ));
        }

        // Quotes are units of currency per one unit of the response base.
        let rebase = match data.base_code.as_deref() {
            Some(code) if !code.eq_ignore_ascii_case(&self.base_currency) => {
                match data.rates.get(&self.base_currency) {
                    Some(base_rate) if *base_rate != 0.0 => *base_rate,
                    _ => {
                        return Err(FetchError::Parse(format!(
                            "response based on {code} has no {} quote",
                            self.base_currency
                        )));
                    }
                }
            }
            _ => 1.0,
        };

        let mut rates = RateMap::new();
        for fiat in &self.fiat_currencies {
            if *fiat == self.base_currency {
                continue;
            }
            let Some(quote) = data.rates.get(fiat).map(|r| r / rebase) else {
                warn!(code = %fiat, "Fiat currency missing from ExchangeRate-API response");
                continue;
            };
            rates.insert(RatePair::new(&self.base_currency, fiat), quote);
            if quote != 0.0 {
                rates.insert(RatePair::new(fiat, &self.base_currency), 1.0 / quote);
            }
        }

        if rates.is_empty() {
            return Err(FetchError::Empty(SOURCE_NAME.to_string()));
        }
        info!("Received {} fiat rates from ExchangeRate-API", rates.len());
        Ok(rates)
    }
}

#[async_trait]
impl RateSource for ExchangeRateProvider {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    #[instrument(
        name = "ExchangeRateFetch",
        skip(self),
        fields(currencies = self.fiat_currencies.len())
    )]
    async fn fetch_rates(&self) -> Result<RateMap, FetchError> {
        with_retry(&self.retry, SOURCE_NAME, || self.fetch_once()).await
    }
}
