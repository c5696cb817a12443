pub mod coingecko;

pub use coingecko::CoinGeckoOracle;

use crate::error::{CoreError, Result};
use crate::types::{Asset, PriceQuote};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Source of USD prices. Failures are retryable by the caller; any caching
/// belongs to the implementation.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn get_price(&self, asset: Asset) -> Result<PriceQuote>;
}

/// Static price table, for offline simulation and tests.
#[derive(Debug, Default)]
pub struct FixedPriceOracle {
    prices: RwLock<HashMap<Asset, f64>>,
}

impl FixedPriceOracle {
    pub fn new(prices: impl IntoIterator<Item = (Asset, f64)>) -> Self {
        Self {
            prices: RwLock::new(prices.into_iter().collect()),
        }
    }

    pub fn set_price(&self, asset: Asset, price: f64) {
        self.prices.write().insert(asset, price);
    }

    /// Make subsequent lookups for `asset` fail.
    pub fn remove_price(&self, asset: Asset) {
        self.prices.write().remove(&asset);
    }
}

#[async_trait]
impl PriceOracle for FixedPriceOracle {
    async fn get_price(&self, asset: Asset) -> Result<PriceQuote> {
        let price = self
            .prices
            .read()
            .get(&asset)
            .copied()
            .ok_or_else(|| CoreError::price_unavailable(asset, "no price configured"))?;
        Ok(PriceQuote::new(asset, price))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_oracle() {
        let oracle = FixedPriceOracle::new([(Asset::Btc, 50_000.0)]);

        assert_eq!(oracle.get_price(Asset::Btc).await.unwrap().price, 50_000.0);
        assert!(matches!(
            oracle.get_price(Asset::Eth).await,
            Err(CoreError::PriceUnavailable { asset: Asset::Eth, .. })
        ));

        oracle.remove_price(Asset::Btc);
        assert!(oracle.get_price(Asset::Btc).await.is_err());
    }
}
