//! Rate source abstraction

use crate::core::error::FetchError;
use crate::core::rates::RateMap;
use async_trait::async_trait;

/// One external rate provider. A fetch returns every pair the provider
/// could supply in a single batch.
#[async_trait]
pub trait RateSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_rates(&self) -> Result<RateMap, FetchError>;
}
