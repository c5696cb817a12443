use crate::error::{CoreError, Result};
use crate::ledger::BalanceStore;
use crate::price::PriceOracle;
use crate::storage::player_store::PlayerData;
use crate::storage::{PlayerStore, Storage};
use crate::types::{Amount, Asset, AssetBalance, PlayerId};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;

/// Creates, loads and values players kept in the game database.
pub struct PlayerManager {
    storage: Arc<Storage>,
}

impl PlayerManager {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        let db_path = data_dir.join("crash.db");
        let storage = Arc::new(Storage::new(&db_path).await?);

        Ok(Self { storage })
    }

    pub fn with_storage(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> Arc<Storage> {
        self.storage.clone()
    }

    pub async fn create_player(
        &self,
        name: &str,
        balances: Vec<(Asset, Amount)>,
    ) -> Result<PlayerData> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::config("Player name cannot be empty"));
        }

        let player_store = PlayerStore::new(&self.storage);
        if player_store.player_exists(name).await? {
            return Err(CoreError::config(format!("Player '{}' already exists", name)));
        }

        let player = PlayerData {
            id: PlayerId::new(),
            name: name.to_string(),
            created_at: Utc::now(),
            balances,
        };
        player_store.save_player(&player).await?;

        tracing::info!("Created player '{}' with ID: {}", player.name, player.id);
        Ok(player)
    }

    pub async fn load_player(&self, name: &str) -> Result<PlayerData> {
        PlayerStore::new(&self.storage)
            .load_player(name)
            .await?
            .ok_or_else(|| CoreError::PlayerNameNotFound {
                name: name.to_string(),
            })
    }

    pub async fn list_players(&self) -> Result<Vec<PlayerData>> {
        PlayerStore::new(&self.storage).list_players().await
    }

    /// Build the in-memory balance store from every persisted player.
    pub async fn load_balances(&self) -> Result<BalanceStore> {
        let balances = BalanceStore::new();
        for player in self.list_players().await? {
            balances.register(player.id, player.balances);
        }

        tracing::info!("Loaded balances for {} players", balances.players().len());
        Ok(balances)
    }

    /// Balances of a player with USD values. An asset whose price cannot be
    /// fetched is shown without a valuation.
    pub async fn wallet(&self, name: &str, oracle: &dyn PriceOracle) -> Result<Vec<AssetBalance>> {
        let player = self.load_player(name).await?;

        let mut wallet = Vec::with_capacity(Asset::ALL.len());
        for asset in Asset::ALL {
            let amount = player
                .balances
                .iter()
                .find(|(a, _)| *a == asset)
                .map(|(_, amount)| *amount)
                .unwrap_or(Amount::ZERO);

            let usd_value = match oracle.get_price(asset).await {
                Ok(quote) => Some(amount.to_usd(asset, quote.price)),
                Err(e) => {
                    tracing::warn!("No {} valuation for '{}': {}", asset, name, e);
                    None
                }
            };

            wallet.push(AssetBalance {
                asset,
                amount,
                usd_value,
            });
        }

        Ok(wallet)
    }
}
