//! Balance table and single-balance operations

use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use types::balance::{Balance, BalanceError};
use types::errors::LedgerError;
use types::ids::AccountId;
use types::market::Asset;

/// Key for one balance entry
pub type BalanceKey = (AccountId, Asset);

/// Absolute balance state after a mutation, for `BalanceUpdate` emission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceChange {
    pub account_id: AccountId,
    pub asset: Asset,
    pub available: Decimal,
    pub reserved: Decimal,
}

/// Why funds entered or left the ledger from outside the matching path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FundingReason {
    Deposit,
    Withdrawal,
}

/// The process-wide balance table.
///
/// Entries are created on first credit and never destroyed; a drained
/// balance simply sits at zero. Per-asset deposit and withdrawal totals are
/// tracked so the conservation audit can reconcile the books.
pub struct Ledger {
    balances: DashMap<BalanceKey, Arc<Mutex<Balance>>>,
    deposits: DashMap<Asset, Decimal>,
    withdrawals: DashMap<Asset, Decimal>,
    fee_account: AccountId,
}

impl Ledger {
    pub fn new(fee_account: AccountId) -> Self {
        Self {
            balances: DashMap::new(),
            deposits: DashMap::new(),
            withdrawals: DashMap::new(),
            fee_account,
        }
    }

    /// Account that accrues maker and taker fees
    pub fn fee_account(&self) -> AccountId {
        self.fee_account
    }

    /// Get or create the balance entry for a key.
    pub(crate) fn entry(&self, key: &BalanceKey) -> Arc<Mutex<Balance>> {
        self.balances
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(Balance::new())))
            .clone()
    }

    pub(crate) fn lock<'a>(
        cell: &'a Mutex<Balance>,
    ) -> Result<MutexGuard<'a, Balance>, LedgerError> {
        cell.lock().map_err(|_| LedgerError::Inconsistent {
            detail: "poisoned balance lock".into(),
        })
    }

    fn change(key: &BalanceKey, balance: &Balance) -> BalanceChange {
        BalanceChange {
            account_id: key.0,
            asset: key.1.clone(),
            available: balance.available,
            reserved: balance.reserved,
        }
    }

    fn map_user_error(err: BalanceError, key: &BalanceKey) -> LedgerError {
        match err {
            BalanceError::Insufficient { required, available } => LedgerError::InsufficientFunds {
                asset: key.1.as_str().to_string(),
                required,
                available,
            },
            BalanceError::ReservedUnderflow { required, reserved } => LedgerError::Inconsistent {
                detail: format!(
                    "reserved underflow for {}/{}: required {}, reserved {}",
                    key.0, key.1, required, reserved
                ),
            },
        }
    }

    /// Move `amount` from available to reserved.
    ///
    /// Fails with `InsufficientFunds` if the available balance is short.
    pub fn reserve(
        &self,
        account: AccountId,
        asset: Asset,
        amount: Decimal,
    ) -> Result<BalanceChange, LedgerError> {
        let key = (account, asset);
        let cell = self.entry(&key);
        let mut balance = Self::lock(&cell)?;
        balance
            .reserve(amount)
            .map_err(|e| Self::map_user_error(e, &key))?;
        Ok(Self::change(&key, &balance))
    }

    /// Move `amount` from reserved back to available.
    ///
    /// A shortfall here means the engine released more than it reserved:
    /// that is `Inconsistent`, not a user error.
    pub fn release(
        &self,
        account: AccountId,
        asset: Asset,
        amount: Decimal,
    ) -> Result<BalanceChange, LedgerError> {
        let key = (account, asset);
        let cell = self.entry(&key);
        let mut balance = Self::lock(&cell)?;
        balance
            .release(amount)
            .map_err(|e| Self::map_user_error(e, &key))?;
        Ok(Self::change(&key, &balance))
    }

    /// Credit available funds from a collaborator (deposits).
    pub fn credit(
        &self,
        account: AccountId,
        asset: Asset,
        amount: Decimal,
        reason: FundingReason,
    ) -> Result<BalanceChange, LedgerError> {
        debug_assert_eq!(reason, FundingReason::Deposit);
        let key = (account, asset.clone());
        let cell = self.entry(&key);
        let mut balance = Self::lock(&cell)?;
        balance.credit(amount);
        *self.deposits.entry(asset).or_insert(Decimal::ZERO) += amount;
        tracing::debug!(account = %key.0, asset = %key.1, %amount, "ledger credit");
        Ok(Self::change(&key, &balance))
    }

    /// Debit available funds for a collaborator (withdrawals).
    pub fn debit(
        &self,
        account: AccountId,
        asset: Asset,
        amount: Decimal,
        reason: FundingReason,
    ) -> Result<BalanceChange, LedgerError> {
        debug_assert_eq!(reason, FundingReason::Withdrawal);
        let key = (account, asset.clone());
        let cell = self.entry(&key);
        let mut balance = Self::lock(&cell)?;
        balance
            .debit(amount)
            .map_err(|e| Self::map_user_error(e, &key))?;
        *self.withdrawals.entry(asset).or_insert(Decimal::ZERO) += amount;
        tracing::debug!(account = %key.0, asset = %key.1, %amount, "ledger debit");
        Ok(Self::change(&key, &balance))
    }

    /// Read one balance.
    pub fn balance(&self, account: AccountId, asset: &Asset) -> Balance {
        self.balances
            .get(&(account, asset.clone()))
            .map(|cell| cell.lock().map(|b| b.clone()).unwrap_or_default())
            .unwrap_or_default()
    }

    /// All balances for one account, sorted by asset.
    pub fn balances_for(&self, account: AccountId) -> Vec<BalanceChange> {
        let mut out: Vec<BalanceChange> = self
            .balances
            .iter()
            .filter(|entry| entry.key().0 == account)
            .filter_map(|entry| {
                entry
                    .value()
                    .lock()
                    .ok()
                    .map(|b| Self::change(entry.key(), &b))
            })
            .collect();
        out.sort_by(|a, b| a.asset.cmp(&b.asset));
        out
    }

    /// Restore a balance to an absolute state (recovery replay only).
    pub fn restore(&self, account: AccountId, asset: Asset, available: Decimal, reserved: Decimal) {
        let key = (account, asset);
        let cell = self.entry(&key);
        let locked = cell.lock();
        if let Ok(mut balance) = locked {
            balance.available = available;
            balance.reserved = reserved;
        }
    }

    /// Sorted snapshot of every balance entry (for digests and audits).
    pub fn snapshot(&self) -> Vec<BalanceChange> {
        let mut out: Vec<BalanceChange> = self
            .balances
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .lock()
                    .ok()
                    .map(|b| Self::change(entry.key(), &b))
            })
            .collect();
        out.sort_by(|a, b| (&a.asset, a.account_id).cmp(&(&b.asset, b.account_id)));
        out
    }

    /// Conservation audit over a quiescent ledger.
    ///
    /// Per asset: Σ(available + reserved) across every account (the fee
    /// account included) must equal Σ deposits − Σ withdrawals. Trades and
    /// fees only move funds between accounts, so any drift is a bug.
    pub fn audit(&self) -> Result<(), LedgerError> {
        let mut held: BTreeMap<Asset, Decimal> = BTreeMap::new();
        for entry in self.balances.iter() {
            let balance = Self::lock(entry.value())?;
            if !balance.check_invariant() {
                return Err(LedgerError::Inconsistent {
                    detail: format!(
                        "negative balance for {}/{}",
                        entry.key().0,
                        entry.key().1
                    ),
                });
            }
            *held.entry(entry.key().1.clone()).or_insert(Decimal::ZERO) += balance.total();
        }

        let mut expected: BTreeMap<Asset, Decimal> = BTreeMap::new();
        for entry in self.deposits.iter() {
            *expected.entry(entry.key().clone()).or_insert(Decimal::ZERO) += *entry.value();
        }
        for entry in self.withdrawals.iter() {
            *expected.entry(entry.key().clone()).or_insert(Decimal::ZERO) -= *entry.value();
        }

        for (asset, total) in &held {
            let want = expected.get(asset).copied().unwrap_or(Decimal::ZERO);
            if *total != want {
                return Err(LedgerError::Inconsistent {
                    detail: format!("conservation drift in {}: held {}, expected {}", asset, total, want),
                });
            }
        }
        for (asset, want) in &expected {
            if !held.contains_key(asset) && !want.is_zero() {
                return Err(LedgerError::Inconsistent {
                    detail: format!("conservation drift in {}: held 0, expected {}", asset, want),
                });
            }
        }
        Ok(())
    }
}
