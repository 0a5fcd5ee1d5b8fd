//! Wallet collaborator boundary
//!
//! Deposits and withdrawals enter the core through this adapter. The core
//! treats them as ledger-only operations; on-chain state is the
//! collaborator's business. Each call carries an `external_ref` so that a
//! collaborator retrying after a timeout cannot double-apply funds.

use crate::accounts::{BalanceChange, FundingReason, Ledger};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use types::errors::LedgerError;
use types::ids::AccountId;
use types::market::Asset;

/// Ledger-facing wallet adapter with per-reference idempotency.
pub struct WalletAdapter {
    ledger: Arc<Ledger>,
    applied: DashMap<String, BalanceChange>,
}

impl WalletAdapter {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self {
            ledger,
            applied: DashMap::new(),
        }
    }

    /// Credit a deposit. Replaying the same `external_ref` returns the
    /// original outcome without touching the ledger again.
    pub fn deposit(
        &self,
        account: AccountId,
        asset: Asset,
        amount: Decimal,
        external_ref: &str,
    ) -> Result<BalanceChange, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::Inconsistent {
                detail: format!("non-positive deposit amount {}", amount),
            });
        }
        match self.applied.entry(external_ref.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(existing) => Ok(existing.get().clone()),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let change = self
                    .ledger
                    .credit(account, asset, amount, FundingReason::Deposit)?;
                slot.insert(change.clone());
                tracing::info!(account = %account, %amount, external_ref, "deposit applied");
                Ok(change)
            }
        }
    }

    /// Debit a withdrawal. Fails with `InsufficientFunds` if the amount
    /// exceeds available (reserved funds cannot be withdrawn). Idempotent
    /// on `external_ref` like `deposit`.
    pub fn withdraw(
        &self,
        account: AccountId,
        asset: Asset,
        amount: Decimal,
        external_ref: &str,
    ) -> Result<BalanceChange, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::Inconsistent {
                detail: format!("non-positive withdrawal amount {}", amount),
            });
        }
        match self.applied.entry(external_ref.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(existing) => Ok(existing.get().clone()),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let change = self
                    .ledger
                    .debit(account, asset, amount, FundingReason::Withdrawal)?;
                slot.insert(change.clone());
                tracing::info!(account = %account, %amount, external_ref, "withdrawal applied");
                Ok(change)
            }
        }
    }
}
