use crate::error::{CoreError, Result};
use crate::types::{Amount, Asset, PlayerId};
use parking_lot::RwLock;
use std::collections::HashMap;

type Balances = HashMap<Asset, Amount>;

/// Authoritative per-player, per-asset balances.
///
/// Each debit or credit takes the write lock for its whole
/// read-check-write, so two mutations of one balance never interleave.
#[derive(Debug, Default)]
pub struct BalanceStore {
    accounts: RwLock<HashMap<PlayerId, Balances>>,
}

impl BalanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a player with opening balances. Re-registering replaces them.
    pub fn register(&self, player_id: PlayerId, balances: impl IntoIterator<Item = (Asset, Amount)>) {
        let balances: Balances = balances.into_iter().collect();
        self.accounts.write().insert(player_id, balances);
    }

    pub fn contains(&self, player_id: PlayerId) -> bool {
        self.accounts.read().contains_key(&player_id)
    }

    pub fn balance(&self, player_id: PlayerId, asset: Asset) -> Result<Amount> {
        let accounts = self.accounts.read();
        let balances = accounts
            .get(&player_id)
            .ok_or(CoreError::PlayerNotFound(player_id))?;
        Ok(balances.get(&asset).copied().unwrap_or(Amount::ZERO))
    }

    /// All balances of a player, in `Asset::ALL` order.
    pub fn snapshot(&self, player_id: PlayerId) -> Result<Vec<(Asset, Amount)>> {
        let accounts = self.accounts.read();
        let balances = accounts
            .get(&player_id)
            .ok_or(CoreError::PlayerNotFound(player_id))?;
        Ok(Asset::ALL
            .iter()
            .map(|asset| (*asset, balances.get(asset).copied().unwrap_or(Amount::ZERO)))
            .collect())
    }

    pub fn players(&self) -> Vec<PlayerId> {
        self.accounts.read().keys().copied().collect()
    }

    /// Subtract `amount`, rejecting the debit if it would go negative.
    /// Returns the new balance.
    pub fn debit(&self, player_id: PlayerId, asset: Asset, amount: Amount) -> Result<Amount> {
        let mut accounts = self.accounts.write();
        let balances = accounts
            .get_mut(&player_id)
            .ok_or(CoreError::PlayerNotFound(player_id))?;
        let current = balances.entry(asset).or_insert(Amount::ZERO);

        let updated = current
            .checked_sub(amount)
            .ok_or(CoreError::InsufficientFunds {
                asset,
                need: amount.units(),
                available: current.units(),
            })?;
        *current = updated;

        tracing::debug!("Debited {} {} units from {}", amount.units(), asset, player_id);
        Ok(updated)
    }

    /// Add `amount`. Returns the new balance.
    pub fn credit(&self, player_id: PlayerId, asset: Asset, amount: Amount) -> Result<Amount> {
        let mut accounts = self.accounts.write();
        let balances = accounts
            .get_mut(&player_id)
            .ok_or(CoreError::PlayerNotFound(player_id))?;
        let current = balances.entry(asset).or_insert(Amount::ZERO);

        let updated = current
            .checked_add(amount)
            .ok_or(CoreError::Overflow(player_id))?;
        *current = updated;

        tracing::debug!("Credited {} {} units to {}", amount.units(), asset, player_id);
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn store_with(units: u64) -> (BalanceStore, PlayerId) {
        let store = BalanceStore::new();
        let player = PlayerId::new();
        store.register(player, [(Asset::Btc, Amount::from_units(units))]);
        (store, player)
    }

    #[test]
    fn test_debit_and_credit() {
        let (store, player) = store_with(1_000);

        store.debit(player, Asset::Btc, Amount::from_units(400)).unwrap();
        store.credit(player, Asset::Btc, Amount::from_units(150)).unwrap();

        assert_eq!(store.balance(player, Asset::Btc).unwrap().units(), 750);
        assert_eq!(store.balance(player, Asset::Eth).unwrap(), Amount::ZERO);
    }

    #[test]
    fn test_overdraft_rejected_without_change() {
        let (store, player) = store_with(100);

        let err = store
            .debit(player, Asset::Btc, Amount::from_units(101))
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientFunds {
                need: 101,
                available: 100,
                ..
            }
        ));
        assert_eq!(store.balance(player, Asset::Btc).unwrap().units(), 100);
    }

    #[test]
    fn test_unknown_player() {
        let store = BalanceStore::new();
        let stranger = PlayerId::new();

        assert!(matches!(
            store.credit(stranger, Asset::Eth, Amount::from_units(1)),
            Err(CoreError::PlayerNotFound(id)) if id == stranger
        ));
        assert!(!store.contains(stranger));
    }

    #[test]
    fn test_concurrent_debits_never_overdraw() {
        let (store, player) = store_with(1_000);
        let store = Arc::new(store);

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.debit(player, Asset::Btc, Amount::from_units(100)).is_ok())
            })
            .collect();

        let succeeded = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(succeeded, 10);
        assert_eq!(store.balance(player, Asset::Btc).unwrap(), Amount::ZERO);
    }
}
