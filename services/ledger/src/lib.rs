//! Ledger Service
//!
//! Owns every (account, asset) balance in the process. All other components
//! mutate funds exclusively through the operations exposed here:
//!
//! - `reserve` / `release`: earmark funds for open orders
//! - `settle`: atomic two-asset settlement of a matched trade
//! - `credit` / `debit`: deposit and withdrawal collaborators
//!
//! Each balance is individually locked. Multi-balance settlement acquires
//! locks in a total order on (asset, account) so that concurrent symbol
//! tasks settling overlapping pairs cannot deadlock.

pub mod accounts;
pub mod settlement;
pub mod wallet;

pub use accounts::{BalanceChange, FundingReason, Ledger};
pub use wallet::WalletAdapter;
