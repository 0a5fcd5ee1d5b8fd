//! Fee schedule and tick-floored fee calculation

use rust_decimal::Decimal;
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

/// Maker/taker fee rates for a symbol.
///
/// Rates are fractions of trade notional (0.0005 = 0.05%). The taker rate
/// must be at least the maker rate, so the reservation taken at submit time
/// (sized at the taker rate) covers whichever role the order ends up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub maker_rate: Decimal,
    pub taker_rate: Decimal,
}

impl FeeSchedule {
    pub fn new(maker_rate: Decimal, taker_rate: Decimal) -> Self {
        assert!(maker_rate >= Decimal::ZERO, "maker rate must be non-negative");
        assert!(taker_rate >= maker_rate, "taker rate must cover maker rate");
        Self {
            maker_rate,
            taker_rate,
        }
    }

    /// Zero-fee schedule (used throughout the scenario tests).
    pub fn zero() -> Self {
        Self {
            maker_rate: Decimal::ZERO,
            taker_rate: Decimal::ZERO,
        }
    }

    /// Default spot schedule: 0.02% maker, 0.05% taker.
    pub fn default_spot() -> Self {
        Self {
            maker_rate: Decimal::from_str_exact("0.0002").unwrap(),
            taker_rate: Decimal::from_str_exact("0.0005").unwrap(),
        }
    }

    /// Maker fee on a trade notional, floored to the price tick.
    pub fn maker_fee(&self, notional: Decimal, price_tick: Decimal) -> Decimal {
        floor_to_tick(notional * self.maker_rate, price_tick)
    }

    /// Taker fee on a trade notional, floored to the price tick.
    pub fn taker_fee(&self, notional: Decimal, price_tick: Decimal) -> Decimal {
        floor_to_tick(notional * self.taker_rate, price_tick)
    }
}

/// Floor a quote amount to a whole number of price ticks.
///
/// Fees below one tick collapse to zero rather than creating dust that the
/// conservation audit could never reconcile.
pub fn floor_to_tick(amount: Decimal, price_tick: Decimal) -> Decimal {
    assert!(price_tick > Decimal::ZERO, "price_tick must be positive");
    (amount / price_tick).floor() * price_tick
}
