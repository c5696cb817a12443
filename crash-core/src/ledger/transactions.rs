use crate::error::{CoreError, Result};
use crate::types::{PlayerId, Transaction};
use parking_lot::RwLock;
use std::collections::HashSet;
use uuid::Uuid;

/// Append-only record of settled bets and cashouts. Entries are never
/// updated or removed.
#[derive(Debug, Default)]
pub struct TransactionLog {
    inner: RwLock<LogInner>,
}

#[derive(Debug, Default)]
struct LogInner {
    entries: Vec<Transaction>,
    ids: HashSet<Uuid>,
}

impl TransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, transaction: Transaction) -> Result<()> {
        let mut inner = self.inner.write();
        if !inner.ids.insert(transaction.transaction_id) {
            return Err(CoreError::DuplicateTransaction(transaction.transaction_id));
        }

        tracing::debug!(
            "Recorded {} transaction {} for player {}",
            transaction.tx_type.as_str(),
            transaction.transaction_id,
            transaction.player_id
        );
        inner.entries.push(transaction);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, transaction_id: Uuid) -> Option<Transaction> {
        self.inner
            .read()
            .entries
            .iter()
            .find(|tx| tx.transaction_id == transaction_id)
            .cloned()
    }

    /// Transactions of one player, oldest first.
    pub fn for_player(&self, player_id: PlayerId) -> Vec<Transaction> {
        self.inner
            .read()
            .entries
            .iter()
            .filter(|tx| tx.player_id == player_id)
            .cloned()
            .collect()
    }

    pub fn entries(&self) -> Vec<Transaction> {
        self.inner.read().entries.clone()
    }
}
