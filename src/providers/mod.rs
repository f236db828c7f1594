pub mod coingecko;
pub mod exchangerate;
pub mod util;

use crate::core::config::AppConfig;
use crate::core::source::RateSource;
use anyhow::Result;
use std::sync::Arc;

pub use coingecko::CoinGeckoProvider;
pub use exchangerate::ExchangeRateProvider;

/// Builds every configured source in merge order: crypto first, then fiat.
pub fn default_sources(config: &AppConfig) -> Result<Vec<Arc<dyn RateSource>>> {
    Ok(vec![
        Arc::new(CoinGeckoProvider::new(config)?),
        Arc::new(ExchangeRateProvider::new(config)?),
    ])
}
