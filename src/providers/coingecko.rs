use super::util::{RetryPolicy, build_client, get_json, with_retry};
use crate::core::config::AppConfig;
use crate::core::error::FetchError;
use crate::core::rates::{RateMap, RatePair};
use crate::core::source::RateSource;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

pub const SOURCE_NAME: &str = "coingecko";

/// `{"bitcoin": {"usd": 65000.0}, ...}`
type SimplePriceResponse = HashMap<String, HashMap<String, Option<f64>>>;

/// Crypto prices from the CoinGecko `simple/price` endpoint, fetched for all
/// tracked coins in one call.
pub struct CoinGeckoProvider {
    url: String,
    base_currency: String,
    /// Tracked code and its CoinGecko id, in config order.
    coins: Vec<(String, String)>,
    client: reqwest::Client,
    timeout: Duration,
    retry: RetryPolicy,
}

impl CoinGeckoProvider {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let coins = config
            .crypto_currencies
            .iter()
            .map(|code| Ok((code.clone(), config.crypto_id(code)?.to_string())))
            .collect::<Result<Vec<_>>>()?;
        let retry = &config.providers.coingecko.retry;

        Ok(CoinGeckoProvider {
            url: config.coingecko_request_url(),
            base_currency: config.base_currency.clone(),
            coins,
            client: build_client(config.request_timeout())
                .context("Failed to build CoinGecko HTTP client")?,
            timeout: config.request_timeout(),
            retry: RetryPolicy::new(retry.max_attempts, retry.retry_delay()),
        })
    }

    async fn fetch_once(&self) -> Result<RateMap, FetchError> {
        debug!("Requesting crypto prices from {}", self.url);
        let data: SimplePriceResponse = get_json(&self.client, &self.url, self.timeout).await?;

        let vs_currency = self.base_currency.to_lowercase();
        let mut rates = RateMap::new();
        for (code, id) in &self.coins {
            match data.get(id).map(|quotes| quotes.get(&vs_currency)) {
                Some(Some(Some(price))) => {
                    rates.insert(RatePair::new(code, &self.base_currency), *price);
                }
                Some(_) => warn!(
                    code = %code,
                    "No {} quote for {} in CoinGecko response", self.base_currency, code
                ),
                None => warn!(
                    code = %code,
                    id = %id,
                    "Crypto currency missing from CoinGecko response"
                ),
            }
        }

        if rates.is_empty() {
            return Err(FetchError::Empty(SOURCE_NAME.to_string()));
        }
        info!("Received {} crypto rates from CoinGecko", rates.len());
        Ok(rates)
    }
}

#[async_trait]
impl RateSource for CoinGeckoProvider {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    #[instrument(name = "CoinGeckoFetch", skip(self), fields(coins = self.coins.len()))]
    async fn fetch_rates(&self) -> Result<RateMap, FetchError> {
        with_retry(&self.retry, SOURCE_NAME, || self.fetch_once()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: &str) -> AppConfig {
        let mut config = AppConfig::default();
        config.crypto_currencies = vec!["BTC".into(), "ETH".into(), "SOL".into()];
        config.providers.coingecko.base_url = base_url.to_string();
        config.providers.coingecko.retry.max_attempts = 2;
        config.providers.coingecko.retry.retry_delay_ms = 1;
        config.request_timeout_secs = 2;
        config
    }

    async fn create_mock_server(status: u16, body: &str) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .and(query_param("ids", "bitcoin,ethereum,solana"))
            .and(query_param("vs_currencies", "usd"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&mock_server)
            .await;
        mock_server
    }

    #[tokio::test]
    async fn test_successful_fetch() {
        let body = r#"{
            "bitcoin": {"usd": 65000.5},
            "ethereum": {"usd": 3200},
            "solana": {"usd": 150.25}
        }"#;
        let mock_server = create_mock_server(200, body).await;
        let provider = CoinGeckoProvider::new(&test_config(&mock_server.uri())).unwrap();

        let rates = provider.fetch_rates().await.unwrap();
        assert_eq!(rates.len(), 3);
        assert_eq!(rates[&RatePair::new("BTC", "USD")], 65000.5);
        assert_eq!(rates[&RatePair::new("ETH", "USD")], 3200.0);
        assert_eq!(rates[&RatePair::new("SOL", "USD")], 150.25);
    }

    #[tokio::test]
    async fn test_missing_coins_are_skipped() {
        let body = r#"{
            "bitcoin": {"usd": 65000.5},
            "ethereum": {"eur": 2900.0}
        }"#;
        let mock_server = create_mock_server(200, body).await;
        let provider = CoinGeckoProvider::new(&test_config(&mock_server.uri())).unwrap();

        let rates = provider.fetch_rates().await.unwrap();
        assert_eq!(rates.len(), 1);
        assert!(rates.contains_key(&RatePair::new("BTC", "USD")));
    }

    #[tokio::test]
    async fn test_empty_response_fails_after_retries() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(2)
            .mount(&mock_server)
            .await;
        let provider = CoinGeckoProvider::new(&test_config(&mock_server.uri())).unwrap();

        let err = provider.fetch_rates().await.unwrap_err();
        assert!(matches!(err, FetchError::Empty(ref name) if name == SOURCE_NAME));
    }

    #[tokio::test]
    async fn test_http_error_is_classified() {
        let mock_server = create_mock_server(429, "rate limited").await;
        let provider = CoinGeckoProvider::new(&test_config(&mock_server.uri())).unwrap();

        let err = provider.fetch_rates().await.unwrap_err();
        match err {
            FetchError::HttpStatus { status, .. } => assert_eq!(status, 429),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_response_is_parse_failure() {
        let mock_server = create_mock_server(200, r#"["not", "an", "object"]"#).await;
        let provider = CoinGeckoProvider::new(&test_config(&mock_server.uri())).unwrap();

        let err = provider.fetch_rates().await.unwrap_err();
        assert!(matches!(err, FetchError::Parse(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_timeout_is_classified() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("{}")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&mock_server)
            .await;
        let mut config = test_config(&mock_server.uri());
        config.request_timeout_secs = 1;
        config.providers.coingecko.retry.max_attempts = 1;
        let provider = CoinGeckoProvider::new(&config).unwrap();

        let err = provider.fetch_rates().await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_connection_refused_is_classified() {
        let mut config = test_config("http://127.0.0.1:1");
        config.providers.coingecko.retry.max_attempts = 1;
        let provider = CoinGeckoProvider::new(&config).unwrap();

        let err = provider.fetch_rates().await.unwrap_err();
        assert!(matches!(err, FetchError::Connection(_)), "got {err:?}");
    }
}
