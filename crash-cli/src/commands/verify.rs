use anyhow::{anyhow, bail, Result};
use clap::Args;
use crash_core::storage::RoundStore;
use crash_core::PlayerManager;
use crash_engine::{commitment_hash, generate_crash_point, verify_commitment};

#[derive(Args)]
pub struct VerifyArgs {
    /// Revealed seed to check
    #[arg(required_unless_present = "round")]
    pub seed: Option<String>,
    /// Commitment hash published before the round
    #[arg(long)]
    pub hash: Option<String>,
    /// Check a finished round from the database instead
    #[arg(short, long, conflicts_with_all = ["seed", "hash"])]
    pub round: Option<u64>,
}

pub async fn handle_verify_command(args: VerifyArgs, manager: &PlayerManager) -> Result<()> {
    let (seed, expected_hash) = match args.round {
        Some(round_number) => {
            let storage = manager.storage();
            let round = RoundStore::new(&storage)
                .load_round(round_number)
                .await?
                .ok_or_else(|| anyhow!("Round {} not found", round_number))?;
            let seed = round
                .seed
                .ok_or_else(|| anyhow!("Round {} has not crashed yet", round_number))?;
            println!("Round {}", round_number);
            if let Some(crash_point) = round.crash_point {
                println!("  Recorded crash point: {:.2}x", crash_point);
            }
            (seed, Some(round.commitment_hash))
        }
        None => {
            let seed = args
                .seed
                .ok_or_else(|| anyhow!("A seed or --round is required"))?;
            (seed, args.hash)
        }
    };

    println!("  Seed: {}", seed);
    println!("  Commitment: {}", commitment_hash(&seed));
    println!("  Crash point: {:.2}x", generate_crash_point(&seed));

    if let Some(hash) = expected_hash {
        if !verify_commitment(&seed, &hash) {
            bail!("Seed does not match commitment {}", hash);
        }
        println!("Commitment verified.");
    }

    Ok(())
}
