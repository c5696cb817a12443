pub mod player_store;
pub mod round_store;
pub mod transaction_store;

pub use player_store::PlayerStore;
pub use round_store::RoundStore;
pub use transaction_store::TransactionStore;

use crate::error::{CoreError, Result};
use rusqlite::Connection;
use std::path::Path;
use std::str::FromStr;
use tokio::sync::Mutex;

pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    pub async fn new(db_path: &Path) -> Result<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CoreError::internal(format!("Failed to create directory: {}", e)))?;
        }

        let conn = Connection::open(db_path)?;
        let storage = Self {
            conn: Mutex::new(conn),
        };

        storage.init_schema().await?;
        Ok(storage)
    }

    async fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().await;

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS players (
                id TEXT PRIMARY KEY,
                name TEXT UNIQUE NOT NULL,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS balances (
                player_id TEXT NOT NULL,
                asset TEXT NOT NULL,
                amount INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                FOREIGN KEY (player_id) REFERENCES players(id),
                PRIMARY KEY (player_id, asset)
            )",
            [],
        )?;

        // Insert-only: no code path updates or deletes these rows
        conn.execute(
            "CREATE TABLE IF NOT EXISTS transactions (
                id TEXT PRIMARY KEY,
                player_id TEXT NOT NULL,
                round_number INTEGER NOT NULL,
                tx_type TEXT NOT NULL,
                asset TEXT NOT NULL,
                amount INTEGER NOT NULL,
                usd_amount REAL NOT NULL,
                price_at_time REAL NOT NULL,
                timestamp INTEGER NOT NULL,
                FOREIGN KEY (player_id) REFERENCES players(id)
            )",
            [],
        )?;

        // Seed and crash point stay NULL until the round has crashed
        conn.execute(
            "CREATE TABLE IF NOT EXISTS rounds (
                round_number INTEGER PRIMARY KEY,
                commitment_hash TEXT NOT NULL,
                seed TEXT,
                crash_point REAL,
                multiplier REAL NOT NULL,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                started_at INTEGER,
                ended_at INTEGER
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS bets (
                round_number INTEGER NOT NULL,
                player_id TEXT NOT NULL,
                asset TEXT NOT NULL,
                stake INTEGER NOT NULL,
                usd_stake REAL NOT NULL,
                price_at_placement REAL NOT NULL,
                outcome TEXT NOT NULL,
                cashout_multiplier REAL,
                payout INTEGER,
                placed_at INTEGER NOT NULL,
                FOREIGN KEY (player_id) REFERENCES players(id),
                PRIMARY KEY (round_number, player_id)
            )",
            [],
        )?;

        Ok(())
    }

    pub async fn get_connection(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

/// Parse a TEXT column into a domain enum, reporting the column on failure.
pub(crate) fn parse_column<T: FromStr>(idx: usize, name: &str, value: String) -> rusqlite::Result<T> {
    value.parse().map_err(|_| {
        rusqlite::Error::InvalidColumnType(idx, name.to_string(), rusqlite::types::Type::Text)
    })
}

pub(crate) fn to_sql_units(units: u64) -> i64 {
    units as i64
}

pub(crate) fn from_sql_units(value: i64) -> u64 {
    value.max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("nested").join("crash.db");

        Storage::new(&db_path).await.unwrap();
        let storage = Storage::new(&db_path).await.unwrap();

        let conn = storage.get_connection().await;
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('players', 'balances', 'transactions', 'rounds', 'bets')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 5);
    }
}
