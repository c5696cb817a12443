use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crash_core::storage::round_store::{BetRecord, RoundRecord};
use crash_core::storage::{PlayerStore, RoundStore, TransactionStore};
use crash_core::{Amount, Asset, CoreError, PlayerId, Storage, Transaction};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Durable store for rounds, bets, balances and transactions.
///
/// The engine never consults it for a live decision; it only keeps a copy
/// for observability and recovery.
#[async_trait]
pub trait RoundRepository: Send + Sync {
    async fn latest_round_number(&self) -> crash_core::Result<Option<u64>>;
    async fn create_round(&self, round: &RoundRecord) -> crash_core::Result<()>;
    async fn mark_live(&self, round_number: u64, started_at: DateTime<Utc>) -> crash_core::Result<()>;
    async fn update_multiplier(&self, round_number: u64, multiplier: f64) -> crash_core::Result<()>;
    async fn finish_round(&self, round: &RoundRecord) -> crash_core::Result<()>;
    async fn save_bet(&self, bet: &BetRecord) -> crash_core::Result<()>;
    async fn append_transaction(&self, tx: &Transaction) -> crash_core::Result<()>;
    async fn save_balance(
        &self,
        player_id: PlayerId,
        asset: Asset,
        amount: Amount,
    ) -> crash_core::Result<()>;
}

pub struct SqliteRepository {
    storage: Arc<Storage>,
}

impl SqliteRepository {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl RoundRepository for SqliteRepository {
    async fn latest_round_number(&self) -> crash_core::Result<Option<u64>> {
        RoundStore::new(&self.storage).latest_round_number().await
    }

    async fn create_round(&self, round: &RoundRecord) -> crash_core::Result<()> {
        RoundStore::new(&self.storage).create_round(round).await
    }

    async fn mark_live(&self, round_number: u64, started_at: DateTime<Utc>) -> crash_core::Result<()> {
        RoundStore::new(&self.storage)
            .mark_live(round_number, started_at)
            .await
    }

    async fn update_multiplier(&self, round_number: u64, multiplier: f64) -> crash_core::Result<()> {
        RoundStore::new(&self.storage)
            .update_multiplier(round_number, multiplier)
            .await
    }

    async fn finish_round(&self, round: &RoundRecord) -> crash_core::Result<()> {
        let (seed, crash_point) = round
            .seed
            .as_deref()
            .zip(round.crash_point)
            .ok_or_else(|| CoreError::internal("Cannot finish a round that has not crashed"))?;

        RoundStore::new(&self.storage)
            .finish_round(
                round.round_number,
                seed,
                crash_point,
                round.ended_at.unwrap_or_else(Utc::now),
            )
            .await
    }

    async fn save_bet(&self, bet: &BetRecord) -> crash_core::Result<()> {
        RoundStore::new(&self.storage).save_bet(bet).await
    }

    async fn append_transaction(&self, tx: &Transaction) -> crash_core::Result<()> {
        TransactionStore::new(&self.storage).append(tx).await
    }

    async fn save_balance(
        &self,
        player_id: PlayerId,
        asset: Asset,
        amount: Amount,
    ) -> crash_core::Result<()> {
        PlayerStore::new(&self.storage)
            .set_balance(player_id, asset, amount)
            .await
    }
}

/// A write queued for the background worker.
#[derive(Debug, Clone)]
pub(crate) enum PersistOp {
    MarkLive {
        round_number: u64,
        started_at: DateTime<Utc>,
    },
    Multiplier {
        round_number: u64,
        multiplier: f64,
    },
    FinishRound(RoundRecord),
    Bet(BetRecord),
    Transaction(Transaction),
    Balance {
        player_id: PlayerId,
        asset: Asset,
        amount: Amount,
    },
}

impl PersistOp {
    fn describe(&self) -> String {
        match self {
            PersistOp::MarkLive { round_number, .. } => format!("live status of round {}", round_number),
            PersistOp::Multiplier { round_number, .. } => format!("multiplier of round {}", round_number),
            PersistOp::FinishRound(round) => format!("crash of round {}", round.round_number),
            PersistOp::Bet(bet) => format!("bet of {} in round {}", bet.player_id, bet.round_number),
            PersistOp::Transaction(tx) => format!("transaction {}", tx.transaction_id),
            PersistOp::Balance { player_id, asset, .. } => format!("{} balance of {}", asset, player_id),
        }
    }

    async fn apply(&self, repository: &dyn RoundRepository) -> crash_core::Result<()> {
        match self {
            PersistOp::MarkLive {
                round_number,
                started_at,
            } => repository.mark_live(*round_number, *started_at).await,
            PersistOp::Multiplier {
                round_number,
                multiplier,
            } => repository.update_multiplier(*round_number, *multiplier).await,
            PersistOp::FinishRound(round) => repository.finish_round(round).await,
            PersistOp::Bet(bet) => repository.save_bet(bet).await,
            PersistOp::Transaction(tx) => repository.append_transaction(tx).await,
            PersistOp::Balance {
                player_id,
                asset,
                amount,
            } => repository.save_balance(*player_id, *asset, *amount).await,
        }
    }
}

/// Sending side of the persistence queue. Writes are applied in order.
#[derive(Debug, Clone)]
pub(crate) struct PersistenceQueue {
    tx: mpsc::UnboundedSender<PersistOp>,
}

impl PersistenceQueue {
    pub(crate) fn submit(&self, op: PersistOp) {
        if let Err(e) = self.tx.send(op) {
            tracing::warn!("Persistence worker gone, dropped {}", e.0.describe());
        }
    }
}

/// Start the worker. It exits once every queue handle is dropped and the
/// backlog is written.
pub(crate) fn spawn_worker(repository: Arc<dyn RoundRepository>) -> (PersistenceQueue, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<PersistOp>();

    let handle = tokio::spawn(async move {
        while let Some(op) = rx.recv().await {
            if let Err(e) = op.apply(repository.as_ref()).await {
                tracing::warn!("Failed to persist {}: {}", op.describe(), e);
            }
        }
        tracing::debug!("Persistence worker stopped");
    });

    (PersistenceQueue { tx }, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crash_core::storage::player_store::PlayerData;
    use crash_core::{BetOutcome, RoundStatus};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_worker_applies_in_order() {
        let temp_dir = tempdir().unwrap();
        let storage = Arc::new(Storage::new(&temp_dir.path().join("crash.db")).await.unwrap());
        let player_id = PlayerId::new();
        PlayerStore::new(&storage)
            .save_player(&PlayerData {
                id: player_id,
                name: "alice".to_string(),
                created_at: Utc::now(),
                balances: vec![(Asset::Btc, Amount::from_units(1_000))],
            })
            .await
            .unwrap();

        let repository = Arc::new(SqliteRepository::new(storage.clone()));
        repository
            .create_round(&RoundRecord {
                round_number: 1,
                commitment_hash: "hash".to_string(),
                seed: None,
                crash_point: None,
                multiplier: 1.0,
                status: RoundStatus::Pending,
                created_at: Utc::now(),
                started_at: None,
                ended_at: None,
            })
            .await
            .unwrap();

        let (queue, worker) = spawn_worker(repository.clone());
        let bet = BetRecord {
            round_number: 1,
            player_id,
            asset: Asset::Btc,
            stake: Amount::from_units(400),
            usd_stake: 10.0,
            price_at_placement: 2.5,
            outcome: BetOutcome::Open,
            cashout_multiplier: None,
            payout: None,
            placed_at: Utc::now(),
        };
        queue.submit(PersistOp::Balance {
            player_id,
            asset: Asset::Btc,
            amount: Amount::from_units(600),
        });
        queue.submit(PersistOp::Bet(bet.clone()));
        queue.submit(PersistOp::Bet(BetRecord {
            outcome: BetOutcome::Lost,
            payout: Some(Amount::ZERO),
            ..bet
        }));
        // Unknown round: fails, is logged, and does not stop the worker
        queue.submit(PersistOp::FinishRound(RoundRecord {
            round_number: 99,
            commitment_hash: "missing".to_string(),
            seed: None,
            crash_point: None,
            multiplier: 1.0,
            status: RoundStatus::Crashed,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        }));
        queue.submit(PersistOp::Multiplier {
            round_number: 1,
            multiplier: 1.0,
        });
        drop(queue);
        worker.await.unwrap();

        let bets = RoundStore::new(&storage).load_bets(1).await.unwrap();
        assert_eq!(bets.len(), 1);
        assert_eq!(bets[0].outcome, BetOutcome::Lost);

        let alice = PlayerStore::new(&storage).load_player("alice").await.unwrap().unwrap();
        assert_eq!(alice.balances, vec![(Asset::Btc, Amount::from_units(600))]);
    }
}
