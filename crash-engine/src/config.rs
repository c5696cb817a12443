use crate::error::{GameError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// When bets are accepted against a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BettingWindow {
    /// Only after the commitment is published and before the clock starts.
    PendingOnly,
    /// Also while the multiplier is climbing.
    PendingAndLive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub tick_interval: Duration,
    /// Multiplier growth per second of live time.
    pub growth_rate: f64,
    /// Pause between a crash and creation of the next round.
    pub cooldown: Duration,
    pub betting_window: BettingWindow,
    /// Time a new round stays pending before going live.
    pub betting_duration: Duration,
    pub round_create_max_attempts: u32,
    pub round_create_backoff: Duration,
    pub round_create_max_backoff: Duration,
    /// Persist the live multiplier every this many ticks.
    pub persist_every_ticks: u32,
    pub history_size: usize,
    pub event_capacity: usize,
    pub command_capacity: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(100),
            growth_rate: 0.01,
            cooldown: Duration::from_secs(5),
            betting_window: BettingWindow::PendingOnly,
            betting_duration: Duration::from_secs(5),
            round_create_max_attempts: 5,
            round_create_backoff: Duration::from_millis(500),
            round_create_max_backoff: Duration::from_secs(8),
            persist_every_ticks: 10,
            history_size: 100,
            event_capacity: 1024,
            command_capacity: 256,
        }
    }
}

impl GameConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            return Err(GameError::config("Tick interval must be greater than 0"));
        }

        if !(self.growth_rate.is_finite() && self.growth_rate > 0.0) {
            return Err(GameError::config("Growth rate must be a positive number"));
        }

        if self.betting_window == BettingWindow::PendingOnly && self.betting_duration.is_zero() {
            return Err(GameError::config(
                "Betting duration must be greater than 0 when bets are only taken while pending",
            ));
        }

        if self.round_create_max_attempts == 0 {
            return Err(GameError::config(
                "Round creation needs at least one attempt",
            ));
        }

        if self.persist_every_ticks == 0 {
            return Err(GameError::config("Persist interval must be at least one tick"));
        }

        if self.event_capacity == 0 || self.command_capacity == 0 {
            return Err(GameError::config("Channel capacities must be greater than 0"));
        }

        Ok(())
    }

    /// Backoff before retry number `attempt` (1-based) of round creation.
    pub fn creation_backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.round_create_backoff
            .saturating_mul(factor)
            .min(self.round_create_max_backoff)
    }
}
