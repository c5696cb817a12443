use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Table};
use crash_core::storage::RoundStore;
use crash_core::{BetOutcome, PlayerManager};

pub async fn handle_history_command(limit: usize, manager: &PlayerManager) -> Result<()> {
    let storage = manager.storage();
    let store = RoundStore::new(&storage);
    let rounds = store.round_history(limit).await?;

    if rounds.is_empty() {
        println!("No finished rounds yet.");
        println!("Play some with: crash simulate --rounds 5");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Round", "Crash", "Bets", "Won", "Seed", "Ended"]);

    for round in rounds {
        let bets = store.load_bets(round.round_number).await?;
        let won = bets
            .iter()
            .filter(|bet| bet.outcome == BetOutcome::Won)
            .count();

        table.add_row(vec![
            round.round_number.to_string(),
            round
                .crash_point
                .map(|c| format!("{:.2}x", c))
                .unwrap_or_default(),
            bets.len().to_string(),
            won.to_string(),
            round.seed.unwrap_or_default(),
            round
                .ended_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default(),
        ]);
    }

    println!("{}", table);
    Ok(())
}
