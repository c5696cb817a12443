mod commands;
mod config;

use clap::{Parser, Subcommand};
use crash_core::{Asset, CoinGeckoOracle, CoreError, FixedPriceOracle, PlayerManager, PriceOracle};
use crash_engine::GameError;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "crash")]
#[command(about = "Provably fair crash game engine")]
#[command(version)]
struct Cli {
    /// Data directory for the game database and config.json
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use fixed prices instead of querying CoinGecko
    #[arg(long, global = true)]
    offline: bool,

    /// BTC price in USD when offline
    #[arg(long, global = true, default_value_t = 50_000.0)]
    btc_price: f64,

    /// ETH price in USD when offline
    #[arg(long, global = true, default_value_t = 3_000.0)]
    eth_price: f64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Player management commands
    #[command(subcommand)]
    Player(commands::PlayerCommands),

    /// Play rounds with the stored players as bots
    Simulate(commands::SimulateArgs),

    /// Verify a revealed seed against its commitment
    Verify(commands::VerifyArgs),

    /// Show finished rounds, most recent first
    History {
        /// Maximum number of rounds
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "crash={},crash_engine={},crash_core={}",
            log_level, log_level, log_level
        )))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let data_dir = cli.data_dir.clone().unwrap_or_else(config::default_data_dir);
    tokio::fs::create_dir_all(&data_dir).await?;

    let settings = config::CliConfig::load(&data_dir)?;
    let manager = PlayerManager::new(&data_dir).await?;

    let oracle: Arc<dyn PriceOracle> = if cli.offline {
        Arc::new(FixedPriceOracle::new([
            (Asset::Btc, cli.btc_price),
            (Asset::Eth, cli.eth_price),
        ]))
    } else {
        Arc::new(CoinGeckoOracle::new(settings.oracle.clone())?)
    };

    let result = match cli.command {
        Commands::Player(cmd) => {
            commands::handle_player_command(cmd, &manager, oracle.as_ref()).await
        }
        Commands::Simulate(args) => {
            commands::handle_simulate_command(args, &manager, oracle, settings.game).await
        }
        Commands::Verify(args) => commands::handle_verify_command(args, &manager).await,
        Commands::History { limit } => commands::handle_history_command(limit, &manager).await,
    };

    if let Err(e) = result {
        report(&e);
        std::process::exit(1);
    }

    Ok(())
}

fn report(e: &anyhow::Error) {
    if let Some(core) = e.downcast_ref::<CoreError>() {
        match core {
            CoreError::PlayerNameNotFound { name } => {
                eprintln!("Error: Player '{}' not found", name);
                eprintln!("Use 'crash player list' to see available players");
            }
            CoreError::PriceUnavailable { asset, reason } => {
                eprintln!("Error: No {} price available: {}", asset, reason);
                eprintln!("Retry later or pass --offline to use fixed prices");
            }
            other => eprintln!("Error: {}", other),
        }
        return;
    }

    if let Some(GameError::Config(msg)) = e.downcast_ref::<GameError>() {
        eprintln!("Error: Invalid game configuration: {}", msg);
        eprintln!("Check config.json in the data directory");
        return;
    }

    eprintln!("Error: {:#}", e);
}
