use crash_core::{Amount, Asset, PlayerId};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;

/// Notifications fanned out to observers of the game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    /// A new round exists and its commitment is public.
    RoundStarted {
        round_number: u64,
        commitment_hash: String,
        growth_rate: f64,
        tick_interval: Duration,
    },
    /// Betting closed for `PendingOnly` rounds and the clock started.
    RoundLive { round_number: u64 },
    MultiplierTick { round_number: u64, multiplier: f64 },
    Crashed {
        round_number: u64,
        crash_point: f64,
        seed: String,
    },
    BetPlaced {
        round_number: u64,
        player_id: PlayerId,
        asset: Asset,
        stake: Amount,
    },
    PlayerCashedOut {
        round_number: u64,
        player_id: PlayerId,
        multiplier: f64,
        payout: Amount,
    },
}

impl GameEvent {
    pub fn round_number(&self) -> u64 {
        match self {
            GameEvent::RoundStarted { round_number, .. }
            | GameEvent::RoundLive { round_number }
            | GameEvent::MultiplierTick { round_number, .. }
            | GameEvent::Crashed { round_number, .. }
            | GameEvent::BetPlaced { round_number, .. }
            | GameEvent::PlayerCashedOut { round_number, .. } => *round_number,
        }
    }
}

/// Stateless fan-out of [`GameEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<GameEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publishing with nobody listening is fine.
    pub fn publish(&self, event: GameEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("No subscribers for game event");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
