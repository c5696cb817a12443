pub mod balance;
pub mod transactions;

pub use balance::BalanceStore;
pub use transactions::TransactionLog;
