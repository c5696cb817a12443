use crate::types::{Asset, PlayerId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Insufficient {asset} balance: need {need} units, have {available} units")]
    InsufficientFunds {
        asset: Asset,
        need: u64,
        available: u64,
    },

    #[error("Player not found: {0}")]
    PlayerNotFound(PlayerId),

    #[error("Player name not found: {name}")]
    PlayerNameNotFound { name: String },

    #[error("Price unavailable for {asset}: {reason}")]
    PriceUnavailable { asset: Asset, reason: String },

    #[error("Duplicate transaction id: {0}")]
    DuplicateTransaction(uuid::Uuid),

    #[error("Balance overflow for player {0}")]
    Overflow(PlayerId),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn price_unavailable(asset: Asset, reason: impl Into<String>) -> Self {
        Self::PriceUnavailable {
            asset,
            reason: reason.into(),
        }
    }
}
