//! Order lifecycle types

use crate::ids::{AccountId, OrderId};
use crate::market::Symbol;
use crate::numeric::{Price, Quantity};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side (buyer or seller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy order (bid)
    BUY,
    /// Sell order (ask)
    SELL,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::BUY => Side::SELL,
            Side::SELL => Side::BUY,
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Rests at a limit price unless immediately marketable
    Limit,
    /// Executes against the book without a price guard; never rests
    Market,
    /// Dormant until triggered, then becomes a Limit order
    StopLimit,
    /// Dormant until triggered, then becomes a Market order
    StopMarket,
}

/// Time-in-force policy for orders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum TimeInForce {
    /// Good-Till-Cancel: remains until filled or explicitly canceled
    GTC,
    /// Immediate-Or-Cancel: match immediately, cancel remainder
    IOC,
    /// Fill-Or-Kill: full match or reject entirely
    FOK,
    /// Good-Till-Date: expire at specified Unix nanos timestamp
    GTD(i64),
}

/// Which price feed a stop order's trigger compares against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerReference {
    /// The symbol's last traded price
    LastPrice,
    /// An externally supplied mark price
    MarkPrice,
}

/// Cancel reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancelReason {
    UserRequested,
    /// Resting order removed because it would have matched its own account
    SelfTradePrevented,
    /// IOC or market remainder that could not execute
    UnfilledRemainder,
    /// GTD deadline reached
    Expired,
}

/// Reject reasons
///
/// Rejection happens only before the order's first book interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    /// Post-only order would have taken liquidity
    WouldCross,
    /// FOK order could not be fully satisfied
    WouldNotFill,
    /// Symbol task halted by an internal inconsistency
    SymbolHalted,
}

/// Order status
///
/// `Filled`, `Cancelled`, and `Rejected` are terminal; no path leaves a
/// terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason")]
pub enum OrderStatus {
    #[serde(rename = "OPEN")]
    Open,

    #[serde(rename = "PARTIALLY_FILLED")]
    PartiallyFilled,

    #[serde(rename = "FILLED")]
    Filled,

    #[serde(rename = "CANCELLED")]
    Cancelled(CancelReason),

    #[serde(rename = "REJECTED")]
    Rejected(RejectReason),
}

impl OrderStatus {
    /// Check if status is terminal (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled(_) | OrderStatus::Rejected(_)
        )
    }
}

/// Complete order structure
///
/// Identity fields are immutable after creation; `filled_quantity`,
/// `remaining_quantity`, `avg_fill_price`, and `status` evolve as the
/// order moves through the book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    /// Limit price; required for Limit and StopLimit
    pub price: Option<Price>,
    /// Trigger price; required for StopLimit and StopMarket
    pub stop_price: Option<Price>,
    /// Reference feed for the stop trigger
    pub trigger: Option<TriggerReference>,
    pub quantity: Quantity,
    pub filled_quantity: Quantity,
    pub remaining_quantity: Quantity,
    /// Quantity-weighted average fill price; None until the first fill
    pub avg_fill_price: Option<Price>,
    /// Quote-denominated spend cap; required for market buys
    pub quote_budget: Option<Decimal>,
    pub time_in_force: TimeInForce,
    pub post_only: bool,
    pub reduce_only: bool,
    pub client_order_id: Option<String>,
    pub status: OrderStatus,
    /// Per-symbol sequence assigned when the owning engine ingests the order
    pub created_seq: u64,
    pub created_at: i64, // Unix nanos
    pub updated_at: i64, // Unix nanos
}

impl Order {
    /// Create a new open order
    pub fn new(
        order_id: OrderId,
        account_id: AccountId,
        symbol: Symbol,
        side: Side,
        order_type: OrderType,
        quantity: Quantity,
        time_in_force: TimeInForce,
        timestamp: i64,
    ) -> Self {
        Self {
            order_id,
            account_id,
            symbol,
            side,
            order_type,
            price: None,
            stop_price: None,
            trigger: None,
            quantity,
            filled_quantity: Quantity::zero(),
            remaining_quantity: quantity,
            avg_fill_price: None,
            quote_budget: None,
            time_in_force,
            post_only: false,
            reduce_only: false,
            client_order_id: None,
            status: OrderStatus::Open,
            created_seq: 0,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    pub fn with_price(mut self, price: Price) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_stop(mut self, stop_price: Price, trigger: TriggerReference) -> Self {
        self.stop_price = Some(stop_price);
        self.trigger = Some(trigger);
        self
    }

    pub fn with_quote_budget(mut self, budget: Decimal) -> Self {
        self.quote_budget = Some(budget);
        self
    }

    pub fn with_client_order_id(mut self, id: impl Into<String>) -> Self {
        self.client_order_id = Some(id.into());
        self
    }

    pub fn with_flags(mut self, post_only: bool, reduce_only: bool) -> Self {
        self.post_only = post_only;
        self.reduce_only = reduce_only;
        self
    }

    /// Check quantity invariant: filled + remaining = total
    pub fn check_invariant(&self) -> bool {
        self.filled_quantity.as_decimal() + self.remaining_quantity.as_decimal()
            == self.quantity.as_decimal()
    }

    /// Check if order is completely filled
    pub fn is_filled(&self) -> bool {
        self.filled_quantity == self.quantity
    }

    /// Check if order has any fills
    pub fn has_fills(&self) -> bool {
        !self.filled_quantity.is_zero()
    }

    /// Apply a fill, updating quantities, average price, and status
    ///
    /// # Panics
    /// Panics if the fill would exceed total quantity or violate invariants
    pub fn add_fill(&mut self, fill_quantity: Quantity, fill_price: Price, timestamp: i64) {
        let new_filled = self.filled_quantity + fill_quantity;

        assert!(
            new_filled.as_decimal() <= self.quantity.as_decimal(),
            "Fill would exceed order quantity"
        );

        // Quantity-weighted average fill price
        let prior_notional = match self.avg_fill_price {
            Some(avg) => self.filled_quantity * avg,
            None => Decimal::ZERO,
        };
        let fill_notional = fill_quantity * fill_price;
        self.avg_fill_price =
            Price::try_new((prior_notional + fill_notional) / new_filled.as_decimal());

        self.filled_quantity = new_filled;
        self.remaining_quantity =
            Quantity::try_new(self.quantity.as_decimal() - new_filled.as_decimal())
                .unwrap_or(Quantity::zero());

        if self.is_filled() {
            self.status = OrderStatus::Filled;
        } else {
            self.status = OrderStatus::PartiallyFilled;
        }

        self.updated_at = timestamp;

        assert!(self.check_invariant(), "Invariant violated after fill");
    }

    /// Cancel the order
    ///
    /// # Panics
    /// Panics if order is already in terminal state
    pub fn cancel(&mut self, reason: CancelReason, timestamp: i64) {
        assert!(!self.status.is_terminal(), "Cannot cancel terminal order");

        self.status = OrderStatus::Cancelled(reason);
        self.updated_at = timestamp;
    }

    /// Reject the order
    ///
    /// # Panics
    /// Panics if the order already interacted with the book
    pub fn reject(&mut self, reason: RejectReason, timestamp: i64) {
        assert!(
            !self.has_fills() && !self.status.is_terminal(),
            "Rejection only precedes book interaction"
        );

        self.status = OrderStatus::Rejected(reason);
        self.updated_at = timestamp;
    }
}
