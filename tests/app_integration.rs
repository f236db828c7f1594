use ratehub::core::config::AppConfig;
use ratehub::store::RateCache;
use std::fs;
use tempfile::TempDir;
use tracing::info;

// Adds automatic logging to test
mod test_utils {
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub async fn create_coingecko_mock(status: u16, body: &str) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .and(query_param("ids", "bitcoin,ethereum"))
            .and(query_param("vs_currencies", "usd"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&mock_server)
            .await;
        mock_server
    }

    pub async fn request_count(server: &MockServer) -> usize {
        server.received_requests().await.map_or(0, |requests| requests.len())
    }

    pub async fn create_exchangerate_mock(status: u16, body: &str) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/test-key/latest/USD"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&mock_server)
            .await;
        mock_server
    }
}

const COINGECKO_BODY: &str = r#"{"bitcoin": {"usd": 65000.5}, "ethereum": {"usd": 3100.25}}"#;
const EXCHANGERATE_BODY: &str = r#"{
    "result": "success",
    "base_code": "USD",
    "conversion_rates": {"USD": 1, "EUR": 0.8, "GBP": 0.5, "JPY": 150.0}
}"#;

fn write_config(dir: &TempDir, coingecko_url: &str, exchangerate_url: &str) -> String {
    let data_path = dir.path().join("data");
    let config_content = format!(
        r#"
        base_currency: "usd"
        fiat_currencies: ["EUR", "GBP"]
        crypto_currencies: ["BTC", "ETH"]
        crypto_ids:
          BTC: bitcoin
          ETH: ethereum
        providers:
          coingecko:
            base_url: {coingecko_url}
            retry:
              max_attempts: 1
              retry_delay_ms: 0
          exchangerate:
            base_url: {exchangerate_url}
            api_key: "test-key"
            retry:
              max_attempts: 1
              retry_delay_ms: 0
        request_timeout_secs: 5
        data_path: "{}"
    "#,
        data_path.display()
    );
    let config_path = dir.path().join("config.yaml");
    fs::write(&config_path, config_content).expect("Failed to write config file");
    config_path.to_string_lossy().into_owned()
}

fn cache_for(config_path: &str) -> RateCache {
    let config = AppConfig::load_from_path(config_path).expect("config should load");
    RateCache::from_config(&config).expect("cache should build")
}

#[test_log::test(tokio::test)]
async fn test_full_update_flow_with_mocks() {
    let coingecko = test_utils::create_coingecko_mock(200, COINGECKO_BODY).await;
    let exchangerate = test_utils::create_exchangerate_mock(200, EXCHANGERATE_BODY).await;
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = write_config(&dir, &coingecko.uri(), &exchangerate.uri());

    let result = ratehub::run_command(
        ratehub::AppCommand::UpdateRates {
            source: None,
            force: false,
        },
        Some(&config_path),
    )
    .await;
    assert!(result.is_ok(), "update-rates failed with: {:?}", result.err());

    let data_dir = dir.path().join("data");
    assert!(data_dir.join("rates.json").exists());
    assert!(data_dir.join("exchange_rates.json").exists());

    let cache = cache_for(&config_path);
    assert!(cache.is_valid());
    assert_eq!(cache.get_rate("BTC", "USD"), Some(65000.5));
    assert_eq!(cache.get_rate("ETH", "USD"), Some(3100.25));
    assert_eq!(cache.get_rate("USD", "EUR"), Some(0.8));
    assert_eq!(cache.get_rate("EUR", "USD"), Some(1.25));
    assert_eq!(cache.get_rate("GBP", "USD"), Some(2.0));
    // JPY is quoted by the provider but not tracked.
    assert_eq!(cache.get_rate("USD", "JPY"), None);

    let snapshot = cache.load_snapshot().expect("snapshot should exist");
    info!(pairs = snapshot.pairs.len(), "Snapshot written");
    assert_eq!(snapshot.pairs.len(), 6);
    assert_eq!(snapshot.source, "ParserService");
    assert_eq!(cache.history().len(), 6);

    for command in [
        ratehub::AppCommand::GetRate {
            from: "usd".to_string(),
            to: "btc".to_string(),
        },
        ratehub::AppCommand::ShowRates(Default::default()),
        ratehub::AppCommand::Status,
    ] {
        let result = ratehub::run_command(command, Some(&config_path)).await;
        assert!(result.is_ok(), "command failed with: {:?}", result.err());
    }
}

#[test_log::test(tokio::test)]
async fn test_single_source_update() {
    let coingecko = test_utils::create_coingecko_mock(200, COINGECKO_BODY).await;
    let exchangerate = test_utils::create_exchangerate_mock(200, EXCHANGERATE_BODY).await;
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = write_config(&dir, &coingecko.uri(), &exchangerate.uri());

    ratehub::run_command(
        ratehub::AppCommand::UpdateRates {
            source: Some("exchangerate".to_string()),
            force: false,
        },
        Some(&config_path),
    )
    .await
    .expect("update-rates should succeed");

    let cache = cache_for(&config_path);
    assert_eq!(cache.get_rate("BTC", "USD"), None);
    assert_eq!(cache.get_rate("USD", "GBP"), Some(0.5));
    assert!(coingecko.received_requests().await.unwrap_or_default().is_empty());

    let unknown = ratehub::run_command(
        ratehub::AppCommand::UpdateRates {
            source: Some("bloomberg".to_string()),
            force: false,
        },
        Some(&config_path),
    )
    .await;
    let message = unknown.expect_err("unknown source should fail").to_string();
    assert!(message.contains("bloomberg"), "unexpected error: {message}");
}

#[test_log::test(tokio::test)]
async fn test_failed_update_keeps_previous_snapshot() {
    let coingecko = test_utils::create_coingecko_mock(200, COINGECKO_BODY).await;
    let exchangerate = test_utils::create_exchangerate_mock(200, EXCHANGERATE_BODY).await;
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = write_config(&dir, &coingecko.uri(), &exchangerate.uri());

    ratehub::run_command(
        ratehub::AppCommand::UpdateRates {
            source: None,
            force: false,
        },
        Some(&config_path),
    )
    .await
    .expect("first update should succeed");
    let rates_file = dir.path().join("data").join("rates.json");
    let before = fs::read_to_string(&rates_file).expect("snapshot should exist");

    // Point the config at servers that only fail.
    let broken_coingecko = test_utils::create_coingecko_mock(500, "boom").await;
    let broken_exchangerate = test_utils::create_exchangerate_mock(
        200,
        r#"{"result": "error", "error-type": "invalid-key"}"#,
    )
    .await;
    let config_path = write_config(&dir, &broken_coingecko.uri(), &broken_exchangerate.uri());

    let result = ratehub::run_command(
        ratehub::AppCommand::UpdateRates {
            source: None,
            force: true,
        },
        Some(&config_path),
    )
    .await;
    assert!(result.is_err());

    assert_eq!(fs::read_to_string(&rates_file).unwrap(), before);
    let cache = cache_for(&config_path);
    assert_eq!(cache.get_rate("BTC", "USD"), Some(65000.5));
    assert_eq!(cache.history().len(), 6);
}

#[test_log::test(tokio::test)]
async fn test_fresh_cache_skips_update_unless_forced() {
    let coingecko = test_utils::create_coingecko_mock(200, COINGECKO_BODY).await;
    let exchangerate = test_utils::create_exchangerate_mock(200, EXCHANGERATE_BODY).await;
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = write_config(&dir, &coingecko.uri(), &exchangerate.uri());

    for _ in 0..2 {
        ratehub::run_command(
            ratehub::AppCommand::UpdateRates {
                source: None,
                force: false,
            },
            Some(&config_path),
        )
        .await
        .expect("update-rates should succeed");
    }
    assert_eq!(test_utils::request_count(&coingecko).await, 1);
    assert_eq!(test_utils::request_count(&exchangerate).await, 1);

    ratehub::run_command(
        ratehub::AppCommand::UpdateRates {
            source: None,
            force: true,
        },
        Some(&config_path),
    )
    .await
    .expect("forced update-rates should succeed");
    assert_eq!(test_utils::request_count(&coingecko).await, 2);
    assert_eq!(test_utils::request_count(&exchangerate).await, 2);
    assert_eq!(cache_for(&config_path).history().len(), 12);
}

#[test_log::test(tokio::test)]
async fn test_get_rate_without_cache_fails() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = write_config(&dir, "http://127.0.0.1:1", "http://127.0.0.1:1");

    let result = ratehub::run_command(
        ratehub::AppCommand::GetRate {
            from: "BTC".to_string(),
            to: "USD".to_string(),
        },
        Some(&config_path),
    )
    .await;

    assert!(result.is_err());
    assert!(!dir.path().join("data").join("rates.json").exists());
}
