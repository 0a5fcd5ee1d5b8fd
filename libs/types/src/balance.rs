//! Available/reserved balance primitives
//!
//! A balance splits funds into `available` (free for withdrawal or new
//! reservations) and `reserved` (earmarked for open orders). Both are
//! always non-negative; their sum changes only through deposits,
//! withdrawals, fees, and trade settlement.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure modes of balance mutations.
///
/// `Insufficient` is a user error; the underflow variants indicate the
/// engine tried to release or spend more than it ever reserved, which is
/// an internal inconsistency the caller must escalate.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BalanceError {
    #[error("insufficient available funds: required {required}, available {available}")]
    Insufficient { required: Decimal, available: Decimal },

    #[error("reserved underflow: required {required}, reserved {reserved}")]
    ReservedUnderflow { required: Decimal, reserved: Decimal },
}

/// Balance for a single (account, asset) pair
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub available: Decimal,
    pub reserved: Decimal,
}

impl Balance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total funds held (available + reserved)
    pub fn total(&self) -> Decimal {
        self.available + self.reserved
    }

    /// Move `amount` from available to reserved.
    pub fn reserve(&mut self, amount: Decimal) -> Result<(), BalanceError> {
        debug_assert!(amount >= Decimal::ZERO);
        if amount > self.available {
            return Err(BalanceError::Insufficient {
                required: amount,
                available: self.available,
            });
        }
        self.available -= amount;
        self.reserved += amount;
        Ok(())
    }

    /// Move `amount` from reserved back to available.
    pub fn release(&mut self, amount: Decimal) -> Result<(), BalanceError> {
        debug_assert!(amount >= Decimal::ZERO);
        if amount > self.reserved {
            return Err(BalanceError::ReservedUnderflow {
                required: amount,
                reserved: self.reserved,
            });
        }
        self.reserved -= amount;
        self.available += amount;
        Ok(())
    }

    /// Consume `amount` out of reserved funds (trade settlement).
    pub fn spend_reserved(&mut self, amount: Decimal) -> Result<(), BalanceError> {
        debug_assert!(amount >= Decimal::ZERO);
        if amount > self.reserved {
            return Err(BalanceError::ReservedUnderflow {
                required: amount,
                reserved: self.reserved,
            });
        }
        self.reserved -= amount;
        Ok(())
    }

    /// Credit `amount` to available funds (deposit or settlement proceeds).
    pub fn credit(&mut self, amount: Decimal) {
        debug_assert!(amount >= Decimal::ZERO);
        self.available += amount;
    }

    /// Debit `amount` from available funds (withdrawal).
    pub fn debit(&mut self, amount: Decimal) -> Result<(), BalanceError> {
        debug_assert!(amount >= Decimal::ZERO);
        if amount > self.available {
            return Err(BalanceError::Insufficient {
                required: amount,
                available: self.available,
            });
        }
        self.available -= amount;
        Ok(())
    }

    /// Non-negativity invariant
    pub fn check_invariant(&self) -> bool {
        self.available >= Decimal::ZERO && self.reserved >= Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_and_release() {
        let mut balance = Balance::new();
        balance.credit(Decimal::from(10000));

        balance.reserve(Decimal::from(3000)).unwrap();
        assert_eq!(balance.available, Decimal::from(7000));
        assert_eq!(balance.reserved, Decimal::from(3000));
        assert_eq!(balance.total(), Decimal::from(10000));

        balance.release(Decimal::from(1000)).unwrap();
        assert_eq!(balance.available, Decimal::from(8000));
        assert_eq!(balance.reserved, Decimal::from(2000));
        assert!(balance.check_invariant());
    }

    #[test]
    fn test_reserve_insufficient() {
        let mut balance = Balance::new();
        balance.credit(Decimal::from(100));

        let err = balance.reserve(Decimal::from(500)).unwrap_err();
        assert!(matches!(err, BalanceError::Insufficient { .. }));
        // No partial mutation
        assert_eq!(balance.available, Decimal::from(100));
        assert_eq!(balance.reserved, Decimal::ZERO);
    }

    #[test]
    fn test_release_underflow_is_internal_error() {
        let mut balance = Balance::new();
        balance.credit(Decimal::from(100));
        balance.reserve(Decimal::from(50)).unwrap();

        let err = balance.release(Decimal::from(60)).unwrap_err();
        assert!(matches!(err, BalanceError::ReservedUnderflow { .. }));
    }

    #[test]
    fn test_spend_reserved() {
        let mut balance = Balance::new();
        balance.credit(Decimal::from(1000));
        balance.reserve(Decimal::from(600)).unwrap();

        balance.spend_reserved(Decimal::from(400)).unwrap();
        assert_eq!(balance.reserved, Decimal::from(200));
        assert_eq!(balance.total(), Decimal::from(600));
    }

    #[test]
    fn test_debit_insufficient() {
        let mut balance = Balance::new();
        balance.credit(Decimal::from(100));
        balance.reserve(Decimal::from(80)).unwrap();

        // Reserved funds cannot be withdrawn
        let err = balance.debit(Decimal::from(50)).unwrap_err();
        assert!(matches!(err, BalanceError::Insufficient { .. }));
    }
}
