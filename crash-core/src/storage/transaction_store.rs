use crate::error::Result;
use crate::storage::{from_sql_units, parse_column, to_sql_units, Storage};
use crate::types::{Amount, PlayerId, Transaction};
use chrono::{DateTime, Utc};
use rusqlite::params;

/// Durable copy of the transaction log. Rows are only ever inserted.
pub struct TransactionStore<'a> {
    storage: &'a Storage,
}

impl<'a> TransactionStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    pub async fn append(&self, tx: &Transaction) -> Result<()> {
        let conn = self.storage.get_connection().await;

        conn.execute(
            "INSERT INTO transactions
             (id, player_id, round_number, tx_type, asset, amount, usd_amount, price_at_time, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                tx.transaction_id.to_string(),
                tx.player_id.to_string(),
                tx.round_number as i64,
                tx.tx_type.as_str(),
                tx.asset.symbol(),
                to_sql_units(tx.amount.units()),
                tx.usd_amount,
                tx.price_at_time,
                tx.timestamp.timestamp_millis(),
            ],
        )?;

        Ok(())
    }

    /// Most recent transactions of a player first.
    pub async fn list_for_player(&self, player_id: PlayerId, limit: usize) -> Result<Vec<Transaction>> {
        let conn = self.storage.get_connection().await;

        let mut stmt = conn.prepare(
            "SELECT id, player_id, round_number, tx_type, asset, amount, usd_amount, price_at_time, timestamp
             FROM transactions WHERE player_id = ?1
             ORDER BY timestamp DESC, rowid DESC LIMIT ?2",
        )?;

        let tx_iter = stmt.query_map(params![player_id.to_string(), limit as i64], |row| {
            let timestamp: i64 = row.get(8)?;
            Ok(Transaction {
                transaction_id: parse_column(0, "id", row.get(0)?)?,
                player_id: parse_column(1, "player_id", row.get(1)?)?,
                round_number: row.get::<_, i64>(2)? as u64,
                tx_type: parse_column(3, "tx_type", row.get(3)?)?,
                asset: parse_column(4, "asset", row.get(4)?)?,
                amount: Amount::from_units(from_sql_units(row.get(5)?)),
                usd_amount: row.get(6)?,
                price_at_time: row.get(7)?,
                timestamp: DateTime::from_timestamp_millis(timestamp).unwrap_or_else(Utc::now),
            })
        })?;

        let mut transactions = Vec::new();
        for tx in tx_iter {
            transactions.push(tx?);
        }

        Ok(transactions)
    }

    pub async fn count(&self) -> Result<u64> {
        let conn = self.storage.get_connection().await;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
