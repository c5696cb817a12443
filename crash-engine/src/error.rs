use crash_core::{Asset, CoreError, PlayerId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GameError>;

#[derive(Error, Debug)]
pub enum GameError {
    #[error("Crash core error: {0}")]
    Core(#[from] CoreError),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Player not found: {0}")]
    PlayerNotFound(PlayerId),

    #[error("No bet found for player {player_id} in round {round_number}")]
    BetNotFound { player_id: PlayerId, round_number: u64 },

    #[error("Bet already placed by player {0} this round")]
    BetAlreadyPlaced(PlayerId),

    #[error("Insufficient {asset} balance: need {need} units, have {available} units")]
    InsufficientBalance {
        asset: Asset,
        need: u64,
        available: u64,
    },

    #[error("Invalid round state: {0}")]
    RoundState(String),

    #[error("Price unavailable for {asset}: {reason}")]
    PriceUnavailable { asset: Asset, reason: String },

    #[error("Bet of player {player_id} in round {round_number} is already settled")]
    DuplicateSettlement { player_id: PlayerId, round_number: u64 },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Round engine stopped")]
    EngineStopped,
}

/// Category of a rejection, as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Validation,
    NotFound,
    InsufficientBalance,
    RoundState,
    PriceUnavailable,
    DuplicateSettlement,
    Persistence,
    Internal,
}

impl GameError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn round_state(msg: impl Into<String>) -> Self {
        Self::RoundState(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            GameError::Validation(_) | GameError::BetAlreadyPlaced(_) | GameError::Config(_) => {
                ErrorKind::Validation
            }
            GameError::PlayerNotFound(_) | GameError::BetNotFound { .. } => ErrorKind::NotFound,
            GameError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            GameError::RoundState(_) => ErrorKind::RoundState,
            GameError::PriceUnavailable { .. } => ErrorKind::PriceUnavailable,
            GameError::DuplicateSettlement { .. } => ErrorKind::DuplicateSettlement,
            GameError::Persistence(_) => ErrorKind::Persistence,
            GameError::Core(core) => match core {
                CoreError::PlayerNotFound(_) | CoreError::PlayerNameNotFound { .. } => {
                    ErrorKind::NotFound
                }
                CoreError::InsufficientFunds { .. } => ErrorKind::InsufficientBalance,
                CoreError::PriceUnavailable { .. } => ErrorKind::PriceUnavailable,
                CoreError::Storage(_) => ErrorKind::Persistence,
                CoreError::Config(_) => ErrorKind::Validation,
                _ => ErrorKind::Internal,
            },
            GameError::EngineStopped => ErrorKind::Internal,
        }
    }

    /// Lift core ledger and pricing errors into their settlement variants.
    pub(crate) fn from_core(err: CoreError) -> Self {
        match err {
            CoreError::PlayerNotFound(id) => GameError::PlayerNotFound(id),
            CoreError::InsufficientFunds {
                asset,
                need,
                available,
            } => GameError::InsufficientBalance {
                asset,
                need,
                available,
            },
            CoreError::PriceUnavailable { asset, reason } => {
                GameError::PriceUnavailable { asset, reason }
            }
            other => GameError::Core(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_keep_their_kind() {
        let player = PlayerId::new();

        let err = GameError::from_core(CoreError::PlayerNotFound(player));
        assert!(matches!(err, GameError::PlayerNotFound(id) if id == player));
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = GameError::from_core(CoreError::price_unavailable(Asset::Eth, "down"));
        assert_eq!(err.kind(), ErrorKind::PriceUnavailable);

        let err = GameError::from(CoreError::internal("boom"));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_duplicate_bet_is_validation() {
        assert_eq!(
            GameError::BetAlreadyPlaced(PlayerId::new()).kind(),
            ErrorKind::Validation
        );
    }
}
