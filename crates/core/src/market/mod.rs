pub mod types;
pub mod yahoo;

pub use types::{BarField, InfoRecord, PriceBar};

use anyhow::Result;

/// The upstream market-data source the gateway proxies.
#[async_trait::async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Daily bars for an upstream-native period (`"1d"`, `"5d"`, `"3y"`, ...),
    /// oldest first. An unknown symbol yields an empty vector.
    async fn history(&self, symbol: &str, period: &str) -> Result<Vec<PriceBar>>;

    /// Flat metadata record for the symbol. Empty when upstream knows nothing.
    async fn info(&self, symbol: &str) -> Result<InfoRecord>;
}
