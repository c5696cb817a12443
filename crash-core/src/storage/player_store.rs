use crate::error::Result;
use crate::storage::{from_sql_units, parse_column, to_sql_units, Storage};
use crate::types::{Amount, Asset, PlayerId};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerData {
    pub id: PlayerId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub balances: Vec<(Asset, Amount)>,
}

pub struct PlayerStore<'a> {
    storage: &'a Storage,
}

impl<'a> PlayerStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    pub async fn save_player(&self, player: &PlayerData) -> Result<()> {
        let mut conn = self.storage.get_connection().await;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO players (id, name, created_at) VALUES (?1, ?2, ?3)",
            params![
                player.id.to_string(),
                player.name,
                player.created_at.timestamp()
            ],
        )?;

        for (asset, amount) in &player.balances {
            tx.execute(
                "INSERT INTO balances (player_id, asset, amount, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    player.id.to_string(),
                    asset.symbol(),
                    to_sql_units(amount.units()),
                    player.created_at.timestamp()
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub async fn load_player(&self, name: &str) -> Result<Option<PlayerData>> {
        let conn = self.storage.get_connection().await;

        let row = conn
            .query_row(
                "SELECT id, name, created_at FROM players WHERE name = ?1",
                params![name],
                |row| {
                    Ok((
                        parse_column::<PlayerId>(0, "id", row.get(0)?)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((id, name, created_at)) => {
                let mut balances = load_balances(&conn, Some(id))?;
                Ok(Some(PlayerData {
                    id,
                    name,
                    created_at: DateTime::from_timestamp(created_at, 0).unwrap_or_else(Utc::now),
                    balances: balances.remove(&id).unwrap_or_default(),
                }))
            }
            None => Ok(None),
        }
    }

    pub async fn list_players(&self) -> Result<Vec<PlayerData>> {
        let conn = self.storage.get_connection().await;

        let mut stmt =
            conn.prepare("SELECT id, name, created_at FROM players ORDER BY created_at ASC, name ASC")?;

        let player_iter = stmt.query_map([], |row| {
            Ok((
                parse_column::<PlayerId>(0, "id", row.get(0)?)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut rows = Vec::new();
        for row in player_iter {
            rows.push(row?);
        }

        let mut balances = load_balances(&conn, None)?;
        Ok(rows
            .into_iter()
            .map(|(id, name, created_at)| PlayerData {
                id,
                name,
                created_at: DateTime::from_timestamp(created_at, 0).unwrap_or_else(Utc::now),
                balances: balances.remove(&id).unwrap_or_default(),
            })
            .collect())
    }

    pub async fn player_exists(&self, name: &str) -> Result<bool> {
        let conn = self.storage.get_connection().await;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM players WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;

        Ok(count > 0)
    }

    /// Persist the current value of one balance.
    pub async fn set_balance(&self, player_id: PlayerId, asset: Asset, amount: Amount) -> Result<()> {
        let conn = self.storage.get_connection().await;

        conn.execute(
            "INSERT OR REPLACE INTO balances (player_id, asset, amount, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                player_id.to_string(),
                asset.symbol(),
                to_sql_units(amount.units()),
                Utc::now().timestamp()
            ],
        )?;

        Ok(())
    }
}

fn load_balances(
    conn: &Connection,
    player: Option<PlayerId>,
) -> Result<HashMap<PlayerId, Vec<(Asset, Amount)>>> {
    let mut stmt = conn.prepare(
        "SELECT player_id, asset, amount FROM balances
         WHERE ?1 IS NULL OR player_id = ?1
         ORDER BY asset ASC",
    )?;

    let balance_iter = stmt.query_map(params![player.map(|p| p.to_string())], |row| {
        Ok((
            parse_column::<PlayerId>(0, "player_id", row.get(0)?)?,
            parse_column::<Asset>(1, "asset", row.get(1)?)?,
            Amount::from_units(from_sql_units(row.get(2)?)),
        ))
    })?;

    let mut balances: HashMap<PlayerId, Vec<(Asset, Amount)>> = HashMap::new();
    for balance in balance_iter {
        let (player_id, asset, amount) = balance?;
        balances.entry(player_id).or_default().push((asset, amount));
    }

    Ok(balances)
}
