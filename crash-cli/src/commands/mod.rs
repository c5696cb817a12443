pub mod history;
pub mod player;
pub mod simulate;
pub mod verify;

pub use history::handle_history_command;
pub use player::{handle_player_command, PlayerCommands};
pub use simulate::{handle_simulate_command, SimulateArgs};
pub use verify::{handle_verify_command, VerifyArgs};

use crash_core::{Amount, Asset};

/// `0.00200000 BTC` style rendering at the asset's full precision.
pub fn format_amount(amount: Amount, asset: Asset) -> String {
    format!(
        "{:.*} {}",
        asset.decimals() as usize,
        amount.to_decimal(asset),
        asset
    )
}

pub fn balance_of(balances: &[(Asset, Amount)], asset: Asset) -> Amount {
    balances
        .iter()
        .find(|(a, _)| *a == asset)
        .map(|(_, amount)| *amount)
        .unwrap_or(Amount::ZERO)
}

pub fn format_usd(usd: Option<f64>) -> String {
    match usd {
        Some(value) => format!("${:.2}", value),
        None => "n/a".to_string(),
    }
}
