//! Trade construction
//!
//! Builds trade records for matched fills: assigns per-symbol trade ids and
//! computes maker/taker fees from the symbol's fee schedule, floored to the
//! price tick. The execution price is always the maker's price.

use types::ids::{AccountId, OrderId, TradeId};
use types::market::SymbolConfig;
use types::numeric::{Price, Quantity};
use types::order::Side;
use types::trade::Trade;

/// Trade factory owned by one symbol engine.
pub struct MatchExecutor {
    next_trade_id: u64,
}

impl MatchExecutor {
    /// Create a new executor; `next_trade_id` is the first id it will assign.
    pub fn new(next_trade_id: u64) -> Self {
        Self { next_trade_id }
    }

    /// The id the next trade will receive (recovery restores this).
    pub fn next_trade_id(&self) -> u64 {
        self.next_trade_id
    }

    pub fn set_next_trade_id(&mut self, next: u64) {
        self.next_trade_id = next;
    }

    /// Build the trade for one matched fill.
    #[allow(clippy::too_many_arguments)]
    pub fn execute_trade(
        &mut self,
        config: &SymbolConfig,
        seq: u64,
        maker_order_id: OrderId,
        maker_account_id: AccountId,
        taker_order_id: OrderId,
        taker_account_id: AccountId,
        taker_side: Side,
        price: Price,
        quantity: Quantity,
        timestamp_ns: i64,
    ) -> Trade {
        debug_assert_ne!(
            maker_account_id, taker_account_id,
            "self-trades are prevented before execution"
        );

        let notional = quantity * price;
        let maker_fee = config.fees.maker_fee(notional, config.price_tick);
        let taker_fee = config.fees.taker_fee(notional, config.price_tick);

        let trade_id = TradeId::new(self.next_trade_id);
        self.next_trade_id += 1;

        Trade::new(
            trade_id,
            seq,
            config.symbol.clone(),
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
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal::prelude::FromStr;
    use types::fee::FeeSchedule;
    use types::market::Symbol;

    fn config(fees: FeeSchedule) -> SymbolConfig {
        SymbolConfig::new(
            Symbol::new("BTC/USDT"),
            Decimal::from_str("0.01").unwrap(),
            Decimal::from_str("0.0001").unwrap(),
            fees,
        )
    }

    #[test]
    fn test_trade_ids_are_sequential() {
        let mut executor = MatchExecutor::new(1);
        let cfg = config(FeeSchedule::zero());

        let t1 = executor.execute_trade(
            &cfg,
            10,
            OrderId::new(1),
            AccountId::new(),
            OrderId::new(2),
            AccountId::new(),
            Side::BUY,
            Price::from_u64(50000),
            Quantity::from_str("0.5").unwrap(),
            1708123456789000000,
        );
        let t2 = executor.execute_trade(
            &cfg,
            11,
            OrderId::new(3),
            AccountId::new(),
            OrderId::new(4),
            AccountId::new(),
            Side::SELL,
            Price::from_u64(50000),
            Quantity::from_str("0.5").unwrap(),
            1708123456790000000,
        );

        assert_eq!(t1.trade_id, TradeId::new(1));
        assert_eq!(t2.trade_id, TradeId::new(2));
        assert_eq!(executor.next_trade_id(), 3);
    }

    #[test]
    fn test_fees_from_schedule() {
        let mut executor = MatchExecutor::new(1);
        let cfg = config(FeeSchedule::default_spot());

        let trade = executor.execute_trade(
            &cfg,
            10,
            OrderId::new(1),
            AccountId::new(),
            OrderId::new(2),
            AccountId::new(),
            Side::BUY,
            Price::from_u64(50000),
            Quantity::from_str("1").unwrap(),
            1708123456789000000,
        );

        // Notional 50000: maker 0.02% = 10, taker 0.05% = 25
        assert_eq!(trade.maker_fee, Decimal::from(10));
        assert_eq!(trade.taker_fee, Decimal::from(25));
    }
}
