use crate::error::{GameError, Result};
use crate::fairness::SeedCommitment;
use chrono::{DateTime, Utc};
use crash_core::storage::round_store::{BetRecord, RoundRecord};
use crash_core::{Amount, Asset, BetOutcome, PlayerId, RoundStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::time::Instant;

/// A stake on one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bet {
    pub player_id: PlayerId,
    pub round_number: u64,
    pub asset: Asset,
    pub stake: Amount,
    pub usd_stake: f64,
    pub price_at_placement: f64,
    pub outcome: BetOutcome,
    pub cashout_multiplier: Option<f64>,
    pub payout: Option<Amount>,
    pub placed_at: DateTime<Utc>,
}

impl Bet {
    pub fn is_open(&self) -> bool {
        self.outcome == BetOutcome::Open
    }

    fn ensure_open(&self) -> Result<()> {
        if self.outcome.is_settled() {
            return Err(GameError::DuplicateSettlement {
                player_id: self.player_id,
                round_number: self.round_number,
            });
        }
        Ok(())
    }

    pub fn to_record(&self) -> BetRecord {
        BetRecord {
            round_number: self.round_number,
            player_id: self.player_id,
            asset: self.asset,
            stake: self.stake,
            usd_stake: self.usd_stake,
            price_at_placement: self.price_at_placement,
            outcome: self.outcome,
            cashout_multiplier: self.cashout_multiplier,
            payout: self.payout,
            placed_at: self.placed_at,
        }
    }
}

/// Bets of a single round, one per player, in placement order.
#[derive(Debug, Clone, Default)]
pub struct BetLedger {
    bets: Vec<Bet>,
    by_player: HashMap<PlayerId, usize>,
}

impl BetLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bets.is_empty()
    }

    pub fn get(&self, player_id: PlayerId) -> Option<&Bet> {
        self.by_player.get(&player_id).map(|&idx| &self.bets[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bet> {
        self.bets.iter()
    }

    pub fn open_count(&self) -> usize {
        self.bets.iter().filter(|bet| bet.is_open()).count()
    }

    pub(crate) fn insert(&mut self, bet: Bet) -> Result<()> {
        if self.by_player.contains_key(&bet.player_id) {
            return Err(GameError::BetAlreadyPlaced(bet.player_id));
        }
        self.by_player.insert(bet.player_id, self.bets.len());
        self.bets.push(bet);
        Ok(())
    }

    /// Fails with `BetNotFound` or `DuplicateSettlement` without touching the bet.
    pub(crate) fn open_bet(&self, player_id: PlayerId, round_number: u64) -> Result<&Bet> {
        let bet = self.get(player_id).ok_or(GameError::BetNotFound {
            player_id,
            round_number,
        })?;
        bet.ensure_open()?;
        Ok(bet)
    }

    pub(crate) fn settle_won(
        &mut self,
        player_id: PlayerId,
        round_number: u64,
        multiplier: f64,
        payout: Amount,
    ) -> Result<&Bet> {
        let idx = *self.by_player.get(&player_id).ok_or(GameError::BetNotFound {
            player_id,
            round_number,
        })?;
        let bet = &mut self.bets[idx];
        bet.ensure_open()?;

        bet.outcome = BetOutcome::Won;
        bet.cashout_multiplier = Some(multiplier);
        bet.payout = Some(payout);
        Ok(bet)
    }

    /// Mark every open bet lost, returning the bets that changed.
    pub(crate) fn settle_open_as_lost(&mut self) -> Vec<Bet> {
        self.bets
            .iter_mut()
            .filter(|bet| bet.is_open())
            .map(|bet| {
                bet.outcome = BetOutcome::Lost;
                bet.payout = Some(Amount::ZERO);
                bet.clone()
            })
            .collect()
    }
}

/// What any observer may know about the current round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundPublicState {
    pub round_number: u64,
    pub multiplier: f64,
    pub commitment_hash: String,
    pub status: RoundStatus,
    pub bet_count: usize,
}

/// A finished round, with its seed revealed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundSummary {
    pub round_number: u64,
    pub crash_point: f64,
    pub commitment_hash: String,
    pub seed: String,
    pub bets: Vec<Bet>,
    pub ended_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct Round {
    round_number: u64,
    commitment: SeedCommitment,
    crash_point: f64,
    multiplier: f64,
    status: RoundStatus,
    bets: BetLedger,
    created_at: DateTime<Utc>,
    live_since: Option<Instant>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl Round {
    /// A pending round. The crash point is derived here and never again.
    pub fn new(round_number: u64, commitment: SeedCommitment) -> Self {
        let crash_point = commitment.crash_point();
        Self {
            round_number,
            commitment,
            crash_point,
            multiplier: 1.0,
            status: RoundStatus::Pending,
            bets: BetLedger::new(),
            created_at: Utc::now(),
            live_since: None,
            started_at: None,
            ended_at: None,
        }
    }

    pub fn round_number(&self) -> u64 {
        self.round_number
    }

    pub fn commitment_hash(&self) -> &str {
        self.commitment.hash()
    }

    pub fn status(&self) -> RoundStatus {
        self.status
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn bets(&self) -> &BetLedger {
        &self.bets
    }

    /// The seed, once the round has crashed.
    pub fn revealed_seed(&self) -> Option<&str> {
        (self.status == RoundStatus::Crashed).then(|| self.commitment.seed())
    }

    pub(crate) fn crash_point(&self) -> f64 {
        self.crash_point
    }

    pub(crate) fn bets_mut(&mut self) -> &mut BetLedger {
        &mut self.bets
    }

    pub(crate) fn go_live(&mut self, now: Instant) {
        self.status = RoundStatus::Live;
        self.live_since = Some(now);
        self.started_at = Some(Utc::now());
        self.multiplier = 1.0;
    }

    /// Multiplier the clock shows at `now`: `1 + elapsed_secs * growth_rate`,
    /// never below the last reading.
    pub(crate) fn multiplier_at(&self, now: Instant, growth_rate: f64) -> f64 {
        match (self.status, self.live_since) {
            (RoundStatus::Live, Some(since)) => {
                let elapsed = now.saturating_duration_since(since).as_secs_f64();
                (1.0 + elapsed * growth_rate).max(self.multiplier)
            }
            _ => self.multiplier,
        }
    }

    pub(crate) fn reaches_crash(&self, multiplier: f64) -> bool {
        multiplier >= self.crash_point
    }

    pub(crate) fn advance(&mut self, multiplier: f64) {
        if multiplier > self.multiplier {
            self.multiplier = multiplier;
        }
    }

    pub(crate) fn crash(&mut self) {
        self.status = RoundStatus::Crashed;
        self.multiplier = self.crash_point;
        self.ended_at = Some(Utc::now());
    }

    pub fn public_state(&self) -> RoundPublicState {
        RoundPublicState {
            round_number: self.round_number,
            multiplier: self.multiplier,
            commitment_hash: self.commitment.hash().to_string(),
            status: self.status,
            bet_count: self.bets.len(),
        }
    }

    pub fn summary(&self) -> Option<RoundSummary> {
        let seed = self.revealed_seed()?;
        Some(RoundSummary {
            round_number: self.round_number,
            crash_point: self.crash_point,
            commitment_hash: self.commitment.hash().to_string(),
            seed: seed.to_string(),
            bets: self.bets.iter().cloned().collect(),
            ended_at: self.ended_at.unwrap_or_else(Utc::now),
        })
    }

    /// Durable copy; seed and crash point are withheld until the crash.
    pub fn to_record(&self) -> RoundRecord {
        let crashed = self.status == RoundStatus::Crashed;
        RoundRecord {
            round_number: self.round_number,
            commitment_hash: self.commitment.hash().to_string(),
            seed: self.revealed_seed().map(str::to_string),
            crash_point: crashed.then_some(self.crash_point),
            multiplier: self.multiplier,
            status: self.status,
            created_at: self.created_at,
            started_at: self.started_at,
            ended_at: self.ended_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn bet(player_id: PlayerId) -> Bet {
        Bet {
            player_id,
            round_number: 1,
            asset: Asset::Btc,
            stake: Amount::from_units(200_000),
            usd_stake: 100.0,
            price_at_placement: 50_000.0,
            outcome: BetOutcome::Open,
            cashout_multiplier: None,
            payout: None,
            placed_at: Utc::now(),
        }
    }

    #[test]
    fn test_one_bet_per_player() {
        let mut ledger = BetLedger::new();
        let player = PlayerId::new();

        ledger.insert(bet(player)).unwrap();
        assert!(matches!(
            ledger.insert(bet(player)),
            Err(GameError::BetAlreadyPlaced(id)) if id == player
        ));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_settlement_happens_once() {
        let mut ledger = BetLedger::new();
        let winner = PlayerId::new();
        let loser = PlayerId::new();
        ledger.insert(bet(winner)).unwrap();
        ledger.insert(bet(loser)).unwrap();

        ledger
            .settle_won(winner, 1, 2.0, Amount::from_units(400_000))
            .unwrap();
        assert!(matches!(
            ledger.settle_won(winner, 1, 3.0, Amount::from_units(600_000)),
            Err(GameError::DuplicateSettlement { .. })
        ));

        let lost = ledger.settle_open_as_lost();
        assert_eq!(lost.len(), 1);
        assert_eq!(lost[0].player_id, loser);
        assert!(ledger.settle_open_as_lost().is_empty());

        let won = ledger.get(winner).unwrap();
        assert_eq!(won.outcome, BetOutcome::Won);
        assert_eq!(won.cashout_multiplier, Some(2.0));
        assert_eq!(won.payout, Some(Amount::from_units(400_000)));
        assert_eq!(ledger.get(loser).unwrap().outcome, BetOutcome::Lost);
        assert!(matches!(
            ledger.open_bet(loser, 1),
            Err(GameError::DuplicateSettlement { .. })
        ));
        assert!(matches!(
            ledger.open_bet(PlayerId::new(), 1),
            Err(GameError::BetNotFound { .. })
        ));
    }

    #[test]
    fn test_multiplier_clock() {
        let mut round = Round::new(7, SeedCommitment::new("abc1237".to_string()));
        let start = Instant::now();

        assert_eq!(round.multiplier_at(start + Duration::from_secs(30), 0.01), 1.0);

        round.go_live(start);
        assert_eq!(round.multiplier(), 1.0);
        assert_eq!(round.multiplier_at(start + Duration::from_secs(50), 0.01), 1.5);
        assert_eq!(round.multiplier_at(start + Duration::from_secs(100), 0.01), 2.0);

        round.advance(2.0);
        // Never moves backwards
        assert_eq!(round.multiplier_at(start, 0.01), 2.0);
        assert!(!round.reaches_crash(3.78));
        assert!(round.reaches_crash(3.79));
    }

    #[test]
    fn test_seed_and_crash_point_hidden_until_crash() {
        let mut round = Round::new(7, SeedCommitment::new("abc1237".to_string()));
        assert!(round.revealed_seed().is_none());
        assert!(round.summary().is_none());
        assert!(round.to_record().crash_point.is_none());
        assert!(round.to_record().seed.is_none());

        round.go_live(Instant::now());
        round.crash();

        assert_eq!(round.status(), RoundStatus::Crashed);
        assert_eq!(round.multiplier(), 3.79);
        assert_eq!(round.revealed_seed(), Some("abc1237"));
        let summary = round.summary().unwrap();
        assert_eq!(summary.crash_point, 3.79);
        assert_eq!(round.to_record().crash_point, Some(3.79));
    }
}
