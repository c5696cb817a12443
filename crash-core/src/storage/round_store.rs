use crate::error::Result;
use crate::storage::{from_sql_units, parse_column, to_sql_units, Storage};
use crate::types::{Amount, Asset, BetOutcome, PlayerId, RoundStatus};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// Durable view of a round. `seed` and `crash_point` are only known once
/// the round has crashed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub round_number: u64,
    pub commitment_hash: String,
    pub seed: Option<String>,
    pub crash_point: Option<f64>,
    pub multiplier: f64,
    pub status: RoundStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetRecord {
    pub round_number: u64,
    pub player_id: PlayerId,
    pub asset: Asset,
    pub stake: Amount,
    pub usd_stake: f64,
    pub price_at_placement: f64,
    pub outcome: BetOutcome,
    pub cashout_multiplier: Option<f64>,
    pub payout: Option<Amount>,
    pub placed_at: DateTime<Utc>,
}

pub struct RoundStore<'a> {
    storage: &'a Storage,
}

impl<'a> RoundStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    pub async fn create_round(&self, round: &RoundRecord) -> Result<()> {
        let conn = self.storage.get_connection().await;

        conn.execute(
            "INSERT INTO rounds
             (round_number, commitment_hash, seed, crash_point, multiplier, status, created_at, started_at, ended_at)
             VALUES (?1, ?2, NULL, NULL, ?3, ?4, ?5, NULL, NULL)",
            params![
                round.round_number as i64,
                round.commitment_hash,
                round.multiplier,
                round.status.as_str(),
                round.created_at.timestamp_millis(),
            ],
        )?;

        tracing::debug!("Saved round {}", round.round_number);
        Ok(())
    }

    pub async fn mark_live(&self, round_number: u64, started_at: DateTime<Utc>) -> Result<()> {
        let conn = self.storage.get_connection().await;

        conn.execute(
            "UPDATE rounds SET status = ?1, started_at = ?2 WHERE round_number = ?3",
            params![
                RoundStatus::Live.as_str(),
                started_at.timestamp_millis(),
                round_number as i64
            ],
        )?;

        Ok(())
    }

    pub async fn update_multiplier(&self, round_number: u64, multiplier: f64) -> Result<()> {
        let conn = self.storage.get_connection().await;

        conn.execute(
            "UPDATE rounds SET multiplier = ?1 WHERE round_number = ?2 AND status = ?3",
            params![multiplier, round_number as i64, RoundStatus::Live.as_str()],
        )?;

        Ok(())
    }

    /// Record the crash and reveal the seed.
    pub async fn finish_round(
        &self,
        round_number: u64,
        seed: &str,
        crash_point: f64,
        ended_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.storage.get_connection().await;

        conn.execute(
            "UPDATE rounds SET seed = ?1, crash_point = ?2, multiplier = ?2, status = ?3, ended_at = ?4
             WHERE round_number = ?5",
            params![
                seed,
                crash_point,
                RoundStatus::Crashed.as_str(),
                ended_at.timestamp_millis(),
                round_number as i64
            ],
        )?;

        tracing::debug!("Finished round {} at {:.2}x", round_number, crash_point);
        Ok(())
    }

    pub async fn load_round(&self, round_number: u64) -> Result<Option<RoundRecord>> {
        let conn = self.storage.get_connection().await;

        let round = conn
            .query_row(
                "SELECT round_number, commitment_hash, seed, crash_point, multiplier, status,
                        created_at, started_at, ended_at
                 FROM rounds WHERE round_number = ?1",
                params![round_number as i64],
                round_from_row,
            )
            .optional()?;

        Ok(round)
    }

    /// Crashed rounds, most recent first.
    pub async fn round_history(&self, limit: usize) -> Result<Vec<RoundRecord>> {
        let conn = self.storage.get_connection().await;

        let mut stmt = conn.prepare(
            "SELECT round_number, commitment_hash, seed, crash_point, multiplier, status,
                    created_at, started_at, ended_at
             FROM rounds WHERE status = ?1
             ORDER BY round_number DESC LIMIT ?2",
        )?;

        let round_iter = stmt.query_map(
            params![RoundStatus::Crashed.as_str(), limit as i64],
            round_from_row,
        )?;

        let mut rounds = Vec::new();
        for round in round_iter {
            rounds.push(round?);
        }

        Ok(rounds)
    }

    pub async fn latest_round_number(&self) -> Result<Option<u64>> {
        let conn = self.storage.get_connection().await;

        let latest: Option<i64> =
            conn.query_row("SELECT MAX(round_number) FROM rounds", [], |row| row.get(0))?;

        Ok(latest.map(|n| n as u64))
    }

    /// Insert a bet, or overwrite it once it has been settled.
    pub async fn save_bet(&self, bet: &BetRecord) -> Result<()> {
        let conn = self.storage.get_connection().await;

        conn.execute(
            "INSERT OR REPLACE INTO bets
             (round_number, player_id, asset, stake, usd_stake, price_at_placement,
              outcome, cashout_multiplier, payout, placed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                bet.round_number as i64,
                bet.player_id.to_string(),
                bet.asset.symbol(),
                to_sql_units(bet.stake.units()),
                bet.usd_stake,
                bet.price_at_placement,
                bet.outcome.as_str(),
                bet.cashout_multiplier,
                bet.payout.map(|p| to_sql_units(p.units())),
                bet.placed_at.timestamp_millis(),
            ],
        )?;

        Ok(())
    }

    pub async fn load_bets(&self, round_number: u64) -> Result<Vec<BetRecord>> {
        let conn = self.storage.get_connection().await;

        let mut stmt = conn.prepare(
            "SELECT round_number, player_id, asset, stake, usd_stake, price_at_placement,
                    outcome, cashout_multiplier, payout, placed_at
             FROM bets WHERE round_number = ?1 ORDER BY placed_at ASC",
        )?;

        let bet_iter = stmt.query_map(params![round_number as i64], |row| {
            let placed_at: i64 = row.get(9)?;
            Ok(BetRecord {
                round_number: row.get::<_, i64>(0)? as u64,
                player_id: parse_column(1, "player_id", row.get(1)?)?,
                asset: parse_column(2, "asset", row.get(2)?)?,
                stake: Amount::from_units(from_sql_units(row.get(3)?)),
                usd_stake: row.get(4)?,
                price_at_placement: row.get(5)?,
                outcome: parse_column(6, "outcome", row.get(6)?)?,
                cashout_multiplier: row.get(7)?,
                payout: row
                    .get::<_, Option<i64>>(8)?
                    .map(|units| Amount::from_units(from_sql_units(units))),
                placed_at: DateTime::from_timestamp_millis(placed_at).unwrap_or_else(Utc::now),
            })
        })?;

        let mut bets = Vec::new();
        for bet in bet_iter {
            bets.push(bet?);
        }

        Ok(bets)
    }
}

fn round_from_row(row: &Row<'_>) -> rusqlite::Result<RoundRecord> {
    let millis = |value: Option<i64>| value.and_then(DateTime::from_timestamp_millis);

    Ok(RoundRecord {
        round_number: row.get::<_, i64>(0)? as u64,
        commitment_hash: row.get(1)?,
        seed: row.get(2)?,
        crash_point: row.get(3)?,
        multiplier: row.get(4)?,
        status: parse_column(5, "status", row.get(5)?)?,
        created_at: millis(row.get(6)?).unwrap_or_else(Utc::now),
        started_at: millis(row.get(7)?),
        ended_at: millis(row.get(8)?),
    })
}
