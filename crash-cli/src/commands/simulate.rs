use super::{balance_of, format_amount};
use anyhow::{bail, Result};
use clap::Args;
use comfy_table::{presets::UTF8_FULL, Table};
use crash_core::{Asset, BetOutcome, PlayerId, PlayerManager, PriceOracle, TransactionLog};
use crash_engine::{EngineContext, GameConfig, GameEvent, RoundEngine, SqliteRepository};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

#[derive(Args)]
pub struct SimulateArgs {
    /// Number of rounds to play
    #[arg(short, long, default_value_t = 5)]
    pub rounds: usize,
    /// USD staked by every player each round
    #[arg(short, long, default_value_t = 10.0)]
    pub stake: f64,
    /// Lowest cashout target a player picks
    #[arg(long, default_value_t = 1.1)]
    pub min_target: f64,
    /// Highest cashout target a player picks
    #[arg(long, default_value_t = 3.0)]
    pub max_target: f64,
}

struct Bot {
    id: PlayerId,
    name: String,
    assets: Vec<Asset>,
}

/// Play `rounds` rounds with every persisted player as a bot. Each bot bets
/// a fixed USD stake and cashes out once the multiplier passes its target.
pub async fn handle_simulate_command(
    args: SimulateArgs,
    manager: &PlayerManager,
    oracle: Arc<dyn PriceOracle>,
    config: GameConfig,
) -> Result<()> {
    if args.rounds == 0 {
        bail!("Nothing to simulate: --rounds must be at least 1");
    }
    if !(args.min_target >= 1.0 && args.min_target < args.max_target) {
        bail!("Cashout targets must satisfy 1.0 <= min-target < max-target");
    }

    let players = manager.list_players().await?;
    let bots: Vec<Bot> = players
        .into_iter()
        .map(|player| Bot {
            id: player.id,
            assets: player
                .balances
                .iter()
                .filter(|(_, amount)| !amount.is_zero())
                .map(|(asset, _)| *asset)
                .collect(),
            name: player.name,
        })
        .filter(|bot| !bot.assets.is_empty())
        .collect();

    if bots.is_empty() {
        bail!("No funded players found. Add one with: crash player add <name> --btc 0.01");
    }

    let names: HashMap<PlayerId, String> =
        bots.iter().map(|bot| (bot.id, bot.name.clone())).collect();

    let ctx = EngineContext::new(
        Arc::new(manager.load_balances().await?),
        Arc::new(TransactionLog::new()),
        oracle,
        Arc::new(SqliteRepository::new(manager.storage())),
    );
    let mut events = ctx.events.subscribe();
    let handle = RoundEngine::spawn(config, ctx).await?;

    println!(
        "Simulating {} rounds with {} players...",
        args.rounds,
        bots.len()
    );

    let mut targets: HashMap<PlayerId, f64> = HashMap::new();
    let mut played = 0;

    while played < args.rounds {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("Simulation fell behind by {} events", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        match event {
            GameEvent::RoundStarted {
                round_number,
                commitment_hash,
                ..
            } => {
                println!("Round {} commitment {}", round_number, commitment_hash);

                targets.clear();
                for bot in &bots {
                    let (asset, target) = {
                        let mut rng = rand::thread_rng();
                        let asset = bot.assets[rng.gen_range(0..bot.assets.len())];
                        let target = rng.gen_range(args.min_target..args.max_target);
                        (asset, (target * 100.0).floor() / 100.0)
                    };

                    match handle.place_bet(bot.id, args.stake, asset).await {
                        Ok(receipt) => {
                            println!(
                                "  {} bets {} aiming for {:.2}x",
                                bot.name,
                                format_amount(receipt.accepted_amount, asset),
                                target
                            );
                            targets.insert(bot.id, target);
                        }
                        Err(e) => println!("  {} sits out: {}", bot.name, e),
                    }
                }
            }

            GameEvent::MultiplierTick { multiplier, .. } => {
                let due: Vec<PlayerId> = targets
                    .iter()
                    .filter(|(_, target)| multiplier >= **target)
                    .map(|(id, _)| *id)
                    .collect();

                for player_id in due {
                    targets.remove(&player_id);
                    let name = names.get(&player_id).map(String::as_str).unwrap_or("?");
                    match handle.request_cashout(player_id).await {
                        Ok(receipt) => println!(
                            "  {} cashed out at {:.2}x for {} (${:.2})",
                            name,
                            receipt.multiplier,
                            format_amount(receipt.payout, receipt.asset),
                            receipt.usd_value
                        ),
                        Err(e) => println!("  {} missed the cashout: {}", name, e),
                    }
                }
            }

            GameEvent::Crashed {
                round_number,
                crash_point,
                seed,
            } => {
                println!(
                    "Round {} crashed at {:.2}x (seed {})",
                    round_number, crash_point, seed
                );
                targets.clear();
                played += 1;
            }

            GameEvent::RoundLive { round_number } => {
                tracing::debug!("Round {} is live", round_number);
            }

            GameEvent::BetPlaced { .. } | GameEvent::PlayerCashedOut { .. } => {}
        }
    }

    let history = handle.round_history(args.rounds).await?;
    handle.shutdown().await?;

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Round", "Crash", "Bets", "Won", "Lost"]);
    for summary in history.iter().rev() {
        let won = summary
            .bets
            .iter()
            .filter(|bet| bet.outcome == BetOutcome::Won)
            .count();
        table.add_row(vec![
            summary.round_number.to_string(),
            format!("{:.2}x", summary.crash_point),
            summary.bets.len().to_string(),
            won.to_string(),
            (summary.bets.len() - won).to_string(),
        ]);
    }
    println!("{}", table);

    let mut balances = Table::new();
    balances.load_preset(UTF8_FULL);
    balances.set_header(vec!["Player", "BTC", "ETH"]);
    for player in manager.list_players().await? {
        let balance = |asset| format_amount(balance_of(&player.balances, asset), asset);
        balances.add_row(vec![
            player.name.clone(),
            balance(Asset::Btc),
            balance(Asset::Eth),
        ]);
    }
    println!("{}", balances);

    Ok(())
}
