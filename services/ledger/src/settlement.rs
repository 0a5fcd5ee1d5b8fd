//! Atomic trade settlement
//!
//! Settlement touches up to five balances: buyer quote, buyer base, seller
//! base, seller quote, and the fee account's quote. All of them are locked
//! before any mutation, in ascending (asset, account) order with asset
//! first, which is the process-wide lock order for multi-balance
//! operations.

use crate::accounts::{BalanceChange, BalanceKey, Ledger};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::MutexGuard;
use types::balance::Balance;
use types::errors::LedgerError;
use types::ids::AccountId;
use types::market::{Asset, SymbolConfig};
use types::trade::Trade;

type Guards<'a> = BTreeMap<(Asset, AccountId), MutexGuard<'a, Balance>>;

fn balance_of<'a, 'g>(guards: &'a mut Guards<'g>, key: &BalanceKey) -> &'a mut Balance {
    guards
        .get_mut(&(key.1.clone(), key.0))
        .expect("every settlement key was locked")
}

impl Ledger {
    /// Settle a matched trade.
    ///
    /// For a trade of quantity `q` at price `p` on BASE/QUOTE:
    /// - buyer: `q·p + buyer_fee` leaves QUOTE reserved, `q` enters BASE
    ///   available
    /// - seller: `q` leaves BASE reserved, `q·p − seller_fee` enters QUOTE
    ///   available
    /// - fee account: both fees enter QUOTE available
    ///
    /// Both reserved debits are checked before anything is applied, so a
    /// shortfall (an engine bug; reservations must cover fills) leaves the
    /// ledger untouched and reports `Inconsistent`.
    ///
    /// Returns the absolute state of every touched balance, in lock order.
    pub fn settle(
        &self,
        trade: &Trade,
        config: &SymbolConfig,
    ) -> Result<Vec<BalanceChange>, LedgerError> {
        let base = trade.symbol.base();
        let quote = trade.symbol.quote();

        let buyer = trade.buyer();
        let seller = trade.seller();
        let quantity = trade.quantity.as_decimal();
        let notional = trade.notional();
        let buyer_cost = notional + trade.buyer_fee();
        let seller_proceeds = notional - trade.seller_fee();
        let fee_total = trade.buyer_fee() + trade.seller_fee();

        debug_assert_eq!(config.symbol, trade.symbol);
        if seller_proceeds < Decimal::ZERO {
            return Err(LedgerError::Inconsistent {
                detail: format!("seller fee exceeds notional on trade {}", trade.trade_id),
            });
        }

        let buyer_quote: BalanceKey = (buyer, quote.clone());
        let buyer_base: BalanceKey = (buyer, base.clone());
        let seller_base: BalanceKey = (seller, base.clone());
        let seller_quote: BalanceKey = (seller, quote.clone());
        let fee_quote: BalanceKey = (self.fee_account(), quote.clone());

        let mut keys = vec![
            buyer_quote.clone(),
            buyer_base.clone(),
            seller_base.clone(),
            seller_quote.clone(),
            fee_quote.clone(),
        ];
        keys.sort_by(|a, b| (&a.1, a.0).cmp(&(&b.1, b.0)));
        keys.dedup();

        let cells: Vec<_> = keys.iter().map(|k| (k.clone(), self.entry(k))).collect();
        let mut guards: Guards<'_> = BTreeMap::new();
        for (key, cell) in &cells {
            guards.insert((key.1.clone(), key.0), Self::lock(cell)?);
        }

        // Check both reserved debits before applying anything
        if balance_of(&mut guards, &buyer_quote).reserved < buyer_cost {
            return Err(LedgerError::Inconsistent {
                detail: format!(
                    "buyer quote reservation short on trade {}: need {}",
                    trade.trade_id, buyer_cost
                ),
            });
        }
        if balance_of(&mut guards, &seller_base).reserved < quantity {
            return Err(LedgerError::Inconsistent {
                detail: format!(
                    "seller base reservation short on trade {}: need {}",
                    trade.trade_id, quantity
                ),
            });
        }

        balance_of(&mut guards, &buyer_quote)
            .spend_reserved(buyer_cost)
            .map_err(|_| LedgerError::Inconsistent {
                detail: format!("buyer quote debit failed on trade {}", trade.trade_id),
            })?;
        balance_of(&mut guards, &buyer_base).credit(quantity);
        balance_of(&mut guards, &seller_base)
            .spend_reserved(quantity)
            .map_err(|_| LedgerError::Inconsistent {
                detail: format!("seller base debit failed on trade {}", trade.trade_id),
            })?;
        balance_of(&mut guards, &seller_quote).credit(seller_proceeds);
        balance_of(&mut guards, &fee_quote).credit(fee_total);

        let changes = keys
            .iter()
            .map(|key| {
                let balance = guards
                    .get(&(key.1.clone(), key.0))
                    .expect("every settlement key was locked");
                BalanceChange {
                    account_id: key.0,
                    asset: key.1.clone(),
                    available: balance.available,
                    reserved: balance.reserved,
                }
            })
            .collect();

        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::FundingReason;
    use rust_decimal::prelude::FromStr;
    use types::fee::FeeSchedule;
    use types::ids::{AccountId, OrderId, TradeId};
    use types::market::{Asset, Symbol};
    use types::numeric::{Price, Quantity};
    use types::order::Side;

    fn config(fees: FeeSchedule) -> SymbolConfig {
        SymbolConfig::new(
            Symbol::new("BTC/USDT"),
            Decimal::from_str("0.01").unwrap(),
            Decimal::from_str("0.0001").unwrap(),
            fees,
        )
    }

    fn trade(
        maker: AccountId,
        taker: AccountId,
        taker_side: Side,
        maker_fee: Decimal,
        taker_fee: Decimal,
    ) -> Trade {
        Trade::new(
            TradeId::new(1),
            1,
            Symbol::new("BTC/USDT"),
            OrderId::new(1),
            OrderId::new(2),
            maker,
            taker,
            taker_side,
            Price::from_u64(50000),
            Quantity::from_str("1").unwrap(),
            maker_fee,
            taker_fee,
            1708123456789000000,
        )
    }

    fn fund_buyer(ledger: &Ledger, buyer: AccountId, amount: Decimal) {
        ledger
            .credit(buyer, Asset::new("USDT"), amount, FundingReason::Deposit)
            .unwrap();
        ledger.reserve(buyer, Asset::new("USDT"), amount).unwrap();
    }

    fn fund_seller(ledger: &Ledger, seller: AccountId, qty: Decimal) {
        ledger
            .credit(seller, Asset::new("BTC"), qty, FundingReason::Deposit)
            .unwrap();
        ledger.reserve(seller, Asset::new("BTC"), qty).unwrap();
    }

    #[test]
    fn test_settle_zero_fee_trade() {
        let ledger = Ledger::new(AccountId::new());
        let maker = AccountId::new();
        let taker = AccountId::new();

        // Taker buys 1 BTC at 50000 from the maker
        fund_buyer(&ledger, taker, Decimal::from(50000));
        fund_seller(&ledger, maker, Decimal::from(1));

        let changes = ledger
            .settle(
                &trade(maker, taker, Side::BUY, Decimal::ZERO, Decimal::ZERO),
                &config(FeeSchedule::zero()),
            )
            .unwrap();
        assert_eq!(changes.len(), 5);

        let taker_btc = ledger.balance(taker, &Asset::new("BTC"));
        assert_eq!(taker_btc.available, Decimal::from(1));
        let taker_usdt = ledger.balance(taker, &Asset::new("USDT"));
        assert_eq!(taker_usdt.available, Decimal::ZERO);
        assert_eq!(taker_usdt.reserved, Decimal::ZERO);

        let maker_usdt = ledger.balance(maker, &Asset::new("USDT"));
        assert_eq!(maker_usdt.available, Decimal::from(50000));
        let maker_btc = ledger.balance(maker, &Asset::new("BTC"));
        assert_eq!(maker_btc.available, Decimal::ZERO);
        assert_eq!(maker_btc.reserved, Decimal::ZERO);

        ledger.audit().unwrap();
    }

    #[test]
    fn test_settle_accrues_fees() {
        let fee_account = AccountId::new();
        let ledger = Ledger::new(fee_account);
        let maker = AccountId::new();
        let taker = AccountId::new();

        let maker_fee = Decimal::from(10);
        let taker_fee = Decimal::from(25);

        fund_buyer(&ledger, taker, Decimal::from(50000) + taker_fee);
        fund_seller(&ledger, maker, Decimal::from(1));

        ledger
            .settle(
                &trade(maker, taker, Side::BUY, maker_fee, taker_fee),
                &config(FeeSchedule::default_spot()),
            )
            .unwrap();

        let fees = ledger.balance(fee_account, &Asset::new("USDT"));
        assert_eq!(fees.available, Decimal::from(35));

        let maker_usdt = ledger.balance(maker, &Asset::new("USDT"));
        assert_eq!(maker_usdt.available, Decimal::from(50000) - maker_fee);

        ledger.audit().unwrap();
    }

    #[test]
    fn test_settle_sell_taker_mirrors_roles() {
        let ledger = Ledger::new(AccountId::new());
        let maker = AccountId::new(); // resting buyer
        let taker = AccountId::new(); // incoming seller

        fund_buyer(&ledger, maker, Decimal::from(50000));
        fund_seller(&ledger, taker, Decimal::from(1));

        ledger
            .settle(
                &trade(maker, taker, Side::SELL, Decimal::ZERO, Decimal::ZERO),
                &config(FeeSchedule::zero()),
            )
            .unwrap();

        assert_eq!(
            ledger.balance(maker, &Asset::new("BTC")).available,
            Decimal::from(1)
        );
        assert_eq!(
            ledger.balance(taker, &Asset::new("USDT")).available,
            Decimal::from(50000)
        );
        ledger.audit().unwrap();
    }

    #[test]
    fn test_settle_unreserved_buyer_is_inconsistent() {
        let ledger = Ledger::new(AccountId::new());
        let maker = AccountId::new();
        let taker = AccountId::new();

        // Seller reserved, buyer not: settlement must refuse and leave
        // the seller untouched.
        fund_seller(&ledger, maker, Decimal::from(1));

        let err = ledger
            .settle(
                &trade(maker, taker, Side::BUY, Decimal::ZERO, Decimal::ZERO),
                &config(FeeSchedule::zero()),
            )
            .unwrap_err();
        assert!(err.is_fatal());

        let maker_btc = ledger.balance(maker, &Asset::new("BTC"));
        assert_eq!(maker_btc.reserved, Decimal::from(1));
        ledger.audit().unwrap();
    }

    #[test]
    fn test_self_settlement_single_account_both_sides() {
        // The engine prevents self-trades, but the ledger must stay
        // internally consistent even if both legs name the same account.
        let ledger = Ledger::new(AccountId::new());
        let user = AccountId::new();

        fund_buyer(&ledger, user, Decimal::from(50000));
        fund_seller(&ledger, user, Decimal::from(1));

        ledger
            .settle(
                &trade(user, user, Side::BUY, Decimal::ZERO, Decimal::ZERO),
                &config(FeeSchedule::zero()),
            )
            .unwrap();
        ledger.audit().unwrap();
    }
}
