use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(Uuid);

impl PlayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for PlayerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Wagerable currencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Asset {
    #[serde(rename = "BTC")]
    Btc,
    #[serde(rename = "ETH")]
    Eth,
}

impl Asset {
    pub const ALL: [Asset; 2] = [Asset::Btc, Asset::Eth];

    /// Decimal places of one base unit (satoshi for BTC, gwei for ETH).
    pub fn decimals(&self) -> u32 {
        match self {
            Asset::Btc => 8,
            Asset::Eth => 9,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Asset::Btc => "BTC",
            Asset::Eth => "ETH",
        }
    }

    pub fn coingecko_id(&self) -> &'static str {
        match self {
            Asset::Btc => "bitcoin",
            Asset::Eth => "ethereum",
        }
    }

    fn unit_scale(&self) -> f64 {
        10f64.powi(self.decimals() as i32)
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Asset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BTC" => Ok(Asset::Btc),
            "ETH" => Ok(Asset::Eth),
            other => Err(format!("Unsupported asset: {}", other)),
        }
    }
}

/// Quantity of an asset in its base units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn from_units(units: u64) -> Self {
        Self(units)
    }

    pub fn units(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Parse a decimal quantity such as `0.002` BTC. Rounds to the nearest unit.
    pub fn from_decimal(value: f64, asset: Asset) -> Option<Self> {
        Self::from_scaled(value * asset.unit_scale(), f64::round)
    }

    /// Asset quantity worth `usd` at `price` USD per whole coin, rounded to the nearest unit.
    pub fn from_usd(usd: f64, price: f64, asset: Asset) -> Option<Self> {
        if !(price.is_finite() && price > 0.0) {
            return None;
        }
        Self::from_scaled(usd * asset.unit_scale() / price, f64::round)
    }

    pub fn to_decimal(&self, asset: Asset) -> f64 {
        self.0 as f64 / asset.unit_scale()
    }

    pub fn to_usd(&self, asset: Asset, price: f64) -> f64 {
        self.to_decimal(asset) * price
    }

    /// Multiply by a payout multiplier, rounding down to whole units.
    pub fn scale(&self, multiplier: f64) -> Option<Self> {
        Self::from_scaled(self.0 as f64 * multiplier, f64::floor)
    }

    pub fn checked_add(self, other: Amount) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    fn from_scaled(raw: f64, round: fn(f64) -> f64) -> Option<Self> {
        let units = round(raw);
        if !units.is_finite() || units < 0.0 || units > u64::MAX as f64 {
            return None;
        }
        Some(Self(units as u64))
    }
}

/// A USD price for one whole coin of `asset`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub asset: Asset,
    pub price: f64,
    pub fetched_at: DateTime<Utc>,
}

impl PriceQuote {
    pub fn new(asset: Asset, price: f64) -> Self {
        Self {
            asset,
            price,
            fetched_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Bet,
    Cashout,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Bet => "bet",
            TransactionType::Cashout => "cashout",
        }
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bet" => Ok(TransactionType::Bet),
            "cashout" => Ok(TransactionType::Cashout),
            other => Err(format!("Unknown transaction type: {}", other)),
        }
    }
}

/// Immutable record of a settled monetary event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: Uuid,
    pub player_id: PlayerId,
    pub round_number: u64,
    pub tx_type: TransactionType,
    pub asset: Asset,
    pub amount: Amount,
    pub usd_amount: f64,
    pub price_at_time: f64,
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        player_id: PlayerId,
        round_number: u64,
        tx_type: TransactionType,
        amount: Amount,
        usd_amount: f64,
        quote: &PriceQuote,
    ) -> Self {
        Self {
            transaction_id: Uuid::new_v4(),
            player_id,
            round_number,
            tx_type,
            asset: quote.asset,
            amount,
            usd_amount,
            price_at_time: quote.price,
            timestamp: Utc::now(),
        }
    }
}

/// Lifecycle of a round: `Pending -> Live -> Crashed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoundStatus {
    Pending,
    Live,
    Crashed,
}

impl RoundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundStatus::Pending => "pending",
            RoundStatus::Live => "live",
            RoundStatus::Crashed => "crashed",
        }
    }
}

impl FromStr for RoundStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RoundStatus::Pending),
            "live" => Ok(RoundStatus::Live),
            "crashed" => Ok(RoundStatus::Crashed),
            other => Err(format!("Unknown round status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BetOutcome {
    Open,
    Won,
    Lost,
}

impl BetOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            BetOutcome::Open => "open",
            BetOutcome::Won => "won",
            BetOutcome::Lost => "lost",
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self, BetOutcome::Open)
    }
}

impl FromStr for BetOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(BetOutcome::Open),
            "won" => Ok(BetOutcome::Won),
            "lost" => Ok(BetOutcome::Lost),
            other => Err(format!("Unknown bet outcome: {}", other)),
        }
    }
}

/// Balance of one asset with an optional USD valuation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetBalance {
    pub asset: Asset,
    pub amount: Amount,
    pub usd_value: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usd_conversion() {
        let stake = Amount::from_usd(100.0, 50_000.0, Asset::Btc).unwrap();
        assert_eq!(stake.units(), 200_000);
        assert_eq!(stake.to_decimal(Asset::Btc), 0.002);

        let payout = stake.scale(2.0).unwrap();
        assert_eq!(payout.to_decimal(Asset::Btc), 0.004);
        assert_eq!(payout.to_usd(Asset::Btc, 50_000.0), 200.0);
    }

    #[test]
    fn test_invalid_conversions() {
        assert!(Amount::from_usd(100.0, 0.0, Asset::Btc).is_none());
        assert!(Amount::from_usd(100.0, f64::NAN, Asset::Eth).is_none());
        assert!(Amount::from_usd(-5.0, 100.0, Asset::Eth).is_none());
        assert!(Amount::from_units(10).scale(f64::INFINITY).is_none());
    }

    #[test]
    fn test_scale_rounds_down() {
        let stake = Amount::from_units(3);
        assert_eq!(stake.scale(1.5).unwrap().units(), 4);
    }

    #[test]
    fn test_asset_parsing() {
        assert_eq!("btc".parse::<Asset>().unwrap(), Asset::Btc);
        assert_eq!("ETH".parse::<Asset>().unwrap(), Asset::Eth);
        assert!("DOGE".parse::<Asset>().is_err());
        assert_eq!(Amount::from_decimal(1.5, Asset::Eth).unwrap().units(), 1_500_000_000);
    }
}
