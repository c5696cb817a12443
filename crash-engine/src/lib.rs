//! Provably fair crash rounds.
//!
//! A [`RoundEngine`] task owns the current round. It publishes a seed
//! commitment, runs the multiplier clock, settles bets and cashouts through
//! the [`SettlementService`] and reveals the seed when the round crashes.
//! Callers talk to it through an [`EngineHandle`].

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod fairness;
pub mod persistence;
pub mod round;
pub mod settlement;

pub use config::{BettingWindow, GameConfig};
pub use engine::{EngineContext, EngineHandle, RoundEngine};
pub use error::{ErrorKind, GameError, Result};
pub use events::{EventBus, GameEvent};
pub use fairness::{
    commitment_hash, generate_crash_point, verify_commitment, FixedSeedSource, RandomSeedSource,
    SeedCommitment, SeedSource,
};
pub use persistence::{RoundRepository, SqliteRepository};
pub use round::{Bet, BetLedger, Round, RoundPublicState, RoundSummary};
pub use settlement::{BetReceipt, CashoutReceipt, SettlementService};

/// Check a revealed seed against a published commitment, returning the
/// crash point it produces when they match.
pub fn verify_round(seed: &str, commitment_hash: &str) -> Option<f64> {
    verify_commitment(seed, commitment_hash).then(|| generate_crash_point(seed))
}
