use crate::config::OracleConfig;
use crate::error::{CoreError, Result};
use crate::price::PriceOracle;
use crate::types::{Asset, PriceQuote};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Instant;

/// CoinGecko `simple/price` client with a short-lived per-asset cache.
pub struct CoinGeckoOracle {
    client: reqwest::Client,
    config: OracleConfig,
    cache: Mutex<HashMap<Asset, (PriceQuote, Instant)>>,
}

impl CoinGeckoOracle {
    pub fn new(config: OracleConfig) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            config,
            cache: Mutex::new(HashMap::new()),
        })
    }

    fn cached(&self, asset: Asset) -> Option<PriceQuote> {
        let cache = self.cache.lock();
        cache
            .get(&asset)
            .filter(|(_, stored_at)| stored_at.elapsed() < self.config.cache_ttl)
            .map(|(quote, _)| *quote)
    }

    async fn fetch(&self, asset: Asset) -> Result<PriceQuote> {
        let url = format!(
            "{}/simple/price?ids={}&vs_currencies=usd",
            self.config.base_url.trim_end_matches('/'),
            asset.coingecko_id()
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CoreError::price_unavailable(asset, e.to_string()))?;

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CoreError::price_unavailable(asset, e.to_string()))?;

        let price = parse_price(&body, asset)?;
        Ok(PriceQuote::new(asset, price))
    }
}

#[async_trait]
impl PriceOracle for CoinGeckoOracle {
    async fn get_price(&self, asset: Asset) -> Result<PriceQuote> {
        if let Some(quote) = self.cached(asset) {
            return Ok(quote);
        }

        let quote = self.fetch(asset).await.map_err(|e| {
            tracing::warn!("Failed to fetch {} price: {}", asset, e);
            e
        })?;

        self.cache.lock().insert(asset, (quote, Instant::now()));
        Ok(quote)
    }
}

/// Extract `{"<coin id>": {"usd": <price>}}` from a response body.
fn parse_price(body: &serde_json::Value, asset: Asset) -> Result<f64> {
    let price = body
        .get(asset.coingecko_id())
        .and_then(|coin| coin.get("usd"))
        .and_then(|usd| usd.as_f64())
        .ok_or_else(|| CoreError::price_unavailable(asset, "invalid price response"))?;

    if !(price.is_finite() && price > 0.0) {
        return Err(CoreError::price_unavailable(
            asset,
            format!("non-positive price {}", price),
        ));
    }

    Ok(price)
}
