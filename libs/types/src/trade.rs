//! Trade execution types

use crate::ids::{AccountId, OrderId, TradeId};
use crate::market::Symbol;
use crate::numeric::{Price, Quantity};
use crate::order::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An atomic exchange between a resting maker order and an incoming taker
///
/// `seq` is the per-symbol monotonic event sequence assigned to the trade;
/// the execution price is always the maker's price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: TradeId,
    pub seq: u64,
    pub symbol: Symbol,

    // Order references
    pub maker_order_id: OrderId,
    pub taker_order_id: OrderId,

    // Account references
    pub maker_account_id: AccountId,
    pub taker_account_id: AccountId,

    /// Side from the taker's perspective
    pub taker_side: Side,
    pub price: Price,
    pub quantity: Quantity,

    // Fees, denominated in the quote asset
    pub maker_fee: Decimal,
    pub taker_fee: Decimal,

    pub timestamp_ns: i64,
}

impl Trade {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        trade_id: TradeId,
        seq: u64,
        symbol: Symbol,
        maker_order_id: OrderId,
        taker_order_id: OrderId,
        maker_account_id: AccountId,
        taker_account_id: AccountId,
        taker_side: Side,
        price: Price,
        quantity: Quantity,
        maker_fee: Decimal,
        taker_fee: Decimal,
        timestamp_ns: i64,
    ) -> Self {
        Self {
            trade_id,
            seq,
            symbol,
            maker_order_id,
            taker_order_id,
            maker_account_id,
            taker_account_id,
            taker_side,
            price,
            quantity,
            maker_fee,
            taker_fee,
            timestamp_ns,
        }
    }

    /// Trade notional (price × quantity), in the quote asset
    pub fn notional(&self) -> Decimal {
        self.quantity * self.price
    }

    /// The account that receives the base asset
    pub fn buyer(&self) -> AccountId {
        match self.taker_side {
            Side::BUY => self.taker_account_id,
            Side::SELL => self.maker_account_id,
        }
    }

    /// The account that delivers the base asset
    pub fn seller(&self) -> AccountId {
        match self.taker_side {
            Side::BUY => self.maker_account_id,
            Side::SELL => self.taker_account_id,
        }
    }

    /// Fee owed by the buyer side of this trade
    pub fn buyer_fee(&self) -> Decimal {
        match self.taker_side {
            Side::BUY => self.taker_fee,
            Side::SELL => self.maker_fee,
        }
    }

    /// Fee owed by the seller side of this trade
    pub fn seller_fee(&self) -> Decimal {
        match self.taker_side {
            Side::BUY => self.maker_fee,
            Side::SELL => self.taker_fee,
        }
    }

    /// Validate no self-trade
    pub fn validate_no_self_trade(&self) -> bool {
        self.maker_account_id != self.taker_account_id
    }
}
