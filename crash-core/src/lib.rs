//! Core library for the crash game: balances, the transaction ledger,
//! USD pricing and SQLite persistence.
//!
//! The round engine in `crash-engine` is the only writer of balances and
//! transactions; everything here is safe to read concurrently.

pub mod config;
pub mod error;
pub mod ledger;
pub mod player;
pub mod price;
pub mod storage;
pub mod types;

pub use config::OracleConfig;
pub use error::{CoreError, Result};
pub use ledger::{BalanceStore, TransactionLog};
pub use player::PlayerManager;
pub use price::{CoinGeckoOracle, FixedPriceOracle, PriceOracle};
pub use storage::Storage;
pub use types::{
    Amount, Asset, AssetBalance, BetOutcome, PlayerId, PriceQuote, RoundStatus, Transaction,
    TransactionType,
};
