use super::{balance_of, format_amount, format_usd};
use anyhow::{anyhow, Result};
use clap::Subcommand;
use comfy_table::{presets::UTF8_FULL, Table};
use crash_core::storage::TransactionStore;
use crash_core::{Amount, Asset, PlayerManager, PriceOracle};

#[derive(Subcommand)]
pub enum PlayerCommands {
    /// Create a player with opening balances
    Add {
        /// Player name
        name: String,
        /// Opening BTC balance, in BTC
        #[arg(long, default_value_t = 0.0)]
        btc: f64,
        /// Opening ETH balance, in ETH
        #[arg(long, default_value_t = 0.0)]
        eth: f64,
    },
    /// List all players
    List,
    /// Show a player's balances with USD values
    Show {
        /// Player name
        name: String,
    },
    /// Show a player's bets and cashouts, most recent first
    Transactions {
        /// Player name
        name: String,
        /// Maximum number of entries
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

pub async fn handle_player_command(
    cmd: PlayerCommands,
    manager: &PlayerManager,
    oracle: &dyn PriceOracle,
) -> Result<()> {
    match cmd {
        PlayerCommands::Add { name, btc, eth } => {
            let balances = vec![
                (Asset::Btc, parse_balance(btc, Asset::Btc)?),
                (Asset::Eth, parse_balance(eth, Asset::Eth)?),
            ];

            let player = manager.create_player(&name, balances).await?;

            println!("Player created successfully!");
            println!("  Name: {}", player.name);
            println!("  ID: {}", player.id);
            for (asset, amount) in &player.balances {
                println!("  {}: {}", asset, format_amount(*amount, *asset));
            }
        }

        PlayerCommands::List => {
            let players = manager.list_players().await?;

            if players.is_empty() {
                println!("No players found.");
                println!("Create one with: crash player add <name> --btc 0.01");
                return Ok(());
            }

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["Name", "ID", "BTC", "ETH", "Created"]);

            for player in players {
                let balance = |asset| format_amount(balance_of(&player.balances, asset), asset);

                table.add_row(vec![
                    player.name.clone(),
                    player.id.to_string(),
                    balance(Asset::Btc),
                    balance(Asset::Eth),
                    player.created_at.format("%Y-%m-%d %H:%M").to_string(),
                ]);
            }

            println!("{}", table);
        }

        PlayerCommands::Show { name } => {
            let player = manager.load_player(&name).await?;
            let wallet = manager.wallet(&name, oracle).await?;

            println!("Player '{}' ({})", player.name, player.id);

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["Asset", "Balance", "USD Value"]);

            let mut total = Some(0.0);
            for entry in &wallet {
                total = total.zip(entry.usd_value).map(|(sum, value)| sum + value);
                table.add_row(vec![
                    entry.asset.to_string(),
                    format_amount(entry.amount, entry.asset),
                    format_usd(entry.usd_value),
                ]);
            }

            println!("{}", table);
            println!("Total: {}", format_usd(total));
        }

        PlayerCommands::Transactions { name, limit } => {
            let player = manager.load_player(&name).await?;
            let storage = manager.storage();
            let transactions = TransactionStore::new(&storage)
                .list_for_player(player.id, limit)
                .await?;

            if transactions.is_empty() {
                println!("No transactions for '{}'.", player.name);
                return Ok(());
            }

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["Time", "Round", "Type", "Amount", "USD", "Price"]);

            for tx in transactions {
                table.add_row(vec![
                    tx.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                    tx.round_number.to_string(),
                    tx.tx_type.as_str().to_string(),
                    format_amount(tx.amount, tx.asset),
                    format_usd(Some(tx.usd_amount)),
                    format!("{:.2}", tx.price_at_time),
                ]);
            }

            println!("{}", table);
        }
    }

    Ok(())
}

fn parse_balance(value: f64, asset: Asset) -> Result<Amount> {
    Amount::from_decimal(value, asset)
        .ok_or_else(|| anyhow!("Invalid {} balance: {}", asset, value))
}
