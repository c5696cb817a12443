use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub base_url: String,
    pub cache_ttl: Duration,
    pub request_timeout: Duration,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.coingecko.com/api/v3".to_string(),
            cache_ttl: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl OracleConfig {
    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(CoreError::config("Price oracle URL cannot be empty"));
        }

        if self.request_timeout.is_zero() {
            return Err(CoreError::config(
                "Price oracle request timeout must be greater than 0",
            ));
        }

        Ok(())
    }
}
