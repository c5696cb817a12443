use crate::config::BettingWindow;
use crate::error::{GameError, Result};
use crate::persistence::{PersistOp, PersistenceQueue};
use crate::round::{Bet, Round};
use chrono::Utc;
use crash_core::{
    Amount, Asset, BalanceStore, BetOutcome, PlayerId, PriceQuote, RoundStatus, Transaction,
    TransactionLog, TransactionType,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Accepted bet, as returned to the bettor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetReceipt {
    pub round_number: u64,
    pub asset: Asset,
    pub accepted_amount: Amount,
    pub usd_amount: f64,
    pub price: f64,
}

/// Accepted cashout, as returned to the player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashoutReceipt {
    pub round_number: u64,
    pub asset: Asset,
    pub multiplier: f64,
    pub payout: Amount,
    pub usd_value: f64,
}

/// The only writer of balances, transactions and bet outcomes.
///
/// Every method runs inside the engine task against the round it owns, so
/// checks and mutations of one request never interleave with another request
/// or with the crash transition. Each method either applies all of its
/// effects or none.
pub struct SettlementService {
    balances: Arc<BalanceStore>,
    transactions: Arc<TransactionLog>,
    persistence: PersistenceQueue,
}

impl SettlementService {
    pub(crate) fn new(
        balances: Arc<BalanceStore>,
        transactions: Arc<TransactionLog>,
        persistence: PersistenceQueue,
    ) -> Self {
        Self {
            balances,
            transactions,
            persistence,
        }
    }

    #[cfg(test)]
    pub(crate) fn balances(&self) -> &Arc<BalanceStore> {
        &self.balances
    }

    #[cfg(test)]
    pub(crate) fn transactions(&self) -> &Arc<TransactionLog> {
        &self.transactions
    }

    pub(crate) fn persistence(&self) -> &PersistenceQueue {
        &self.persistence
    }

    pub(crate) fn place_bet(
        &self,
        round: &mut Round,
        player_id: PlayerId,
        usd_amount: f64,
        quote: &PriceQuote,
        window: BettingWindow,
    ) -> Result<BetReceipt> {
        if !(usd_amount.is_finite() && usd_amount > 0.0) {
            return Err(GameError::validation("Bet amount must be a positive number"));
        }

        match (round.status(), window) {
            (RoundStatus::Pending, _) | (RoundStatus::Live, BettingWindow::PendingAndLive) => {}
            (status, _) => {
                return Err(GameError::round_state(format!(
                    "Round {} is not accepting bets ({})",
                    round.round_number(),
                    status.as_str()
                )));
            }
        }

        if !self.balances.contains(player_id) {
            return Err(GameError::PlayerNotFound(player_id));
        }
        if round.bets().get(player_id).is_some() {
            return Err(GameError::BetAlreadyPlaced(player_id));
        }

        let asset = quote.asset;
        let stake = Amount::from_usd(usd_amount, quote.price, asset).ok_or_else(|| {
            GameError::PriceUnavailable {
                asset,
                reason: format!("unusable price {}", quote.price),
            }
        })?;
        if stake.is_zero() {
            return Err(GameError::validation(format!(
                "Bet of {} USD is below one base unit of {}",
                usd_amount, asset
            )));
        }

        let remaining = self
            .balances
            .debit(player_id, asset, stake)
            .map_err(GameError::from_core)?;

        let transaction = Transaction::new(
            player_id,
            round.round_number(),
            TransactionType::Bet,
            stake,
            usd_amount,
            quote,
        );
        if let Err(e) = self.transactions.append(transaction.clone()) {
            self.rollback_debit(player_id, asset, stake);
            return Err(GameError::from_core(e));
        }

        let bet = Bet {
            player_id,
            round_number: round.round_number(),
            asset,
            stake,
            usd_stake: usd_amount,
            price_at_placement: quote.price,
            outcome: BetOutcome::Open,
            cashout_multiplier: None,
            payout: None,
            placed_at: Utc::now(),
        };
        let record = bet.to_record();
        round.bets_mut().insert(bet)?;

        self.persistence.submit(PersistOp::Balance {
            player_id,
            asset,
            amount: remaining,
        });
        self.persistence.submit(PersistOp::Transaction(transaction));
        self.persistence.submit(PersistOp::Bet(record));

        tracing::info!(
            "Player {} bet {} {} units ({} USD) on round {}",
            player_id,
            stake.units(),
            asset,
            usd_amount,
            round.round_number()
        );

        Ok(BetReceipt {
            round_number: round.round_number(),
            asset,
            accepted_amount: stake,
            usd_amount,
            price: quote.price,
        })
    }

    /// Settle the player's open bet as won at `multiplier`, which must be
    /// the engine's reading for a live round and below its crash point.
    pub(crate) fn cash_out(
        &self,
        round: &mut Round,
        player_id: PlayerId,
        multiplier: f64,
        quote: &PriceQuote,
    ) -> Result<CashoutReceipt> {
        let round_number = round.round_number();
        if round.status() != RoundStatus::Live || round.reaches_crash(multiplier) {
            return Err(GameError::round_state(format!(
                "Round {} cannot pay out at {:.2}x",
                round_number, multiplier
            )));
        }
        let bet = round.bets().open_bet(player_id, round_number)?;
        let asset = bet.asset;

        if quote.asset != asset {
            return Err(GameError::validation(format!(
                "Cashout priced in {} but the bet is in {}",
                quote.asset, asset
            )));
        }

        let payout = bet.stake.scale(multiplier).ok_or_else(|| {
            GameError::Core(crash_core::CoreError::internal(format!(
                "Payout overflow at {}x",
                multiplier
            )))
        })?;
        let usd_value = payout.to_usd(asset, quote.price);

        let balance = self
            .balances
            .credit(player_id, asset, payout)
            .map_err(GameError::from_core)?;

        let transaction = Transaction::new(
            player_id,
            round_number,
            TransactionType::Cashout,
            payout,
            usd_value,
            quote,
        );
        if let Err(e) = self.transactions.append(transaction.clone()) {
            self.rollback_credit(player_id, asset, payout);
            return Err(GameError::from_core(e));
        }

        let record = round
            .bets_mut()
            .settle_won(player_id, round_number, multiplier, payout)?
            .to_record();

        self.persistence.submit(PersistOp::Balance {
            player_id,
            asset,
            amount: balance,
        });
        self.persistence.submit(PersistOp::Transaction(transaction));
        self.persistence.submit(PersistOp::Bet(record));

        tracing::info!(
            "Player {} cashed out of round {} at {:.2}x for {} {} units",
            player_id,
            round_number,
            multiplier,
            payout.units(),
            asset
        );

        Ok(CashoutReceipt {
            round_number,
            asset,
            multiplier,
            payout,
            usd_value,
        })
    }

    /// Mark every open bet of a crashed round as lost. Stakes were debited
    /// at placement, so balances do not move.
    pub(crate) fn settle_losses(&self, round: &mut Round) -> Vec<Bet> {
        let lost = round.bets_mut().settle_open_as_lost();
        for bet in &lost {
            self.persistence.submit(PersistOp::Bet(bet.to_record()));
        }
        if !lost.is_empty() {
            tracing::info!(
                "Round {} crashed with {} open bets lost",
                round.round_number(),
                lost.len()
            );
        }
        lost
    }

    fn rollback_debit(&self, player_id: PlayerId, asset: Asset, amount: Amount) {
        if let Err(e) = self.balances.credit(player_id, asset, amount) {
            tracing::error!("Failed to roll back debit for {}: {}", player_id, e);
        }
    }

    fn rollback_credit(&self, player_id: PlayerId, asset: Asset, amount: Amount) {
        if let Err(e) = self.balances.debit(player_id, asset, amount) {
            tracing::error!("Failed to roll back credit for {}: {}", player_id, e);
        }
    }
}
