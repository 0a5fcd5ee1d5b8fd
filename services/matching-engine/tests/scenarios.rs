//! End-to-end matching scenarios
//!
//! Each test drives a fresh engine + ledger pair through a literal
//! sequence of intents and checks trades, statuses, book state, and
//! balances. Tick 0.01, step 0.0001, zero fees throughout.

use ledger::{FundingReason, Ledger};
use matching_engine::engine::reservation_for;
use matching_engine::{CommandOutcome, EngineCommand, EngineEvent, MatchStep, SymbolEngine};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromStr;
use std::sync::Arc;
use types::fee::FeeSchedule;
use types::ids::{AccountId, OrderId};
use types::market::{Asset, Symbol, SymbolConfig};
use types::numeric::{Price, Quantity};
use types::order::{
    CancelReason, Order, OrderStatus, OrderType, RejectReason, Side, TimeInForce, TriggerReference,
};

const TS: i64 = 1708123456789000000;

fn config() -> SymbolConfig {
    SymbolConfig::new(
        Symbol::new("BTC/USDT"),
        Decimal::from_str("0.01").unwrap(),
        Decimal::from_str("0.0001").unwrap(),
        FeeSchedule::zero(),
    )
}

fn setup() -> (SymbolEngine, Arc<Ledger>) {
    let ledger = Arc::new(Ledger::new(AccountId::new()));
    (SymbolEngine::new(config(), ledger.clone()), ledger)
}

fn fund(ledger: &Ledger, account: AccountId, asset: &str, amount: &str) {
    ledger
        .credit(
            account,
            Asset::new(asset),
            Decimal::from_str(amount).unwrap(),
            FundingReason::Deposit,
        )
        .unwrap();
}

fn limit(id: u64, account: AccountId, side: Side, price: &str, qty: &str) -> Order {
    Order::new(
        OrderId::new(id),
        account,
        Symbol::new("BTC/USDT"),
        side,
        OrderType::Limit,
        Quantity::from_str(qty).unwrap(),
        TimeInForce::GTC,
        TS,
    )
    .with_price(Price::from_str(price).unwrap())
}

fn place(engine: &mut SymbolEngine, ledger: &Ledger, order: Order) -> (Order, MatchStep) {
    let (asset, reserved) = reservation_for(engine.config(), &order).unwrap();
    ledger.reserve(order.account_id, asset, reserved).unwrap();
    let (outcome, step) = engine.apply(EngineCommand::Place { order, reserved }, TS);
    match outcome {
        CommandOutcome::Placed(order) => (*order, step),
        other => panic!("expected Placed, got {:?}", other),
    }
}

fn available(ledger: &Ledger, account: AccountId, asset: &str) -> Decimal {
    ledger.balance(account, &Asset::new(asset)).available
}

#[test]
fn simple_cross() {
    let (mut engine, ledger) = setup();
    let a = AccountId::new();
    let b = AccountId::new();
    fund(&ledger, a, "BTC", "1");
    fund(&ledger, b, "USDT", "50000");

    let (a_order, _) = place(
        &mut engine,
        &ledger,
        limit(1, a, Side::SELL, "50000.00", "1.0000"),
    );
    assert_eq!(a_order.status, OrderStatus::Open);

    let (b_order, step) = place(
        &mut engine,
        &ledger,
        limit(2, b, Side::BUY, "50000.00", "1.0000"),
    );

    let trades: Vec<_> = step.trades().collect();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].price, Price::from_str("50000.00").unwrap());
    assert_eq!(trades[0].quantity, Quantity::from_str("1.0000").unwrap());

    assert_eq!(b_order.status, OrderStatus::Filled);
    let (outcome, _) = engine.apply(EngineCommand::Query { order_id: OrderId::new(1) }, TS + 1);
    match outcome {
        CommandOutcome::OrderSnapshot(order) => assert_eq!(order.status, OrderStatus::Filled),
        other => panic!("expected OrderSnapshot, got {:?}", other),
    }

    assert!(engine.best_bid().is_none());
    assert!(engine.best_ask().is_none());

    assert_eq!(available(&ledger, a, "USDT"), Decimal::from(50000));
    assert_eq!(available(&ledger, b, "BTC"), Decimal::from(1));
    ledger.audit().unwrap();
}

#[test]
fn price_time_priority() {
    let (mut engine, ledger) = setup();
    let x = AccountId::new();
    let y = AccountId::new();
    let buyer = AccountId::new();
    fund(&ledger, x, "BTC", "1");
    fund(&ledger, y, "BTC", "1");
    fund(&ledger, buyer, "USDT", "150");

    // X rests first at 100, then Y at the same price
    place(&mut engine, &ledger, limit(1, x, Side::SELL, "100.00", "1.0000"));
    place(&mut engine, &ledger, limit(2, y, Side::SELL, "100.00", "1.0000"));

    let market_buy = Order::new(
        OrderId::new(3),
        buyer,
        Symbol::new("BTC/USDT"),
        Side::BUY,
        OrderType::Market,
        Quantity::from_str("1.5000").unwrap(),
        TimeInForce::IOC,
        TS,
    )
    .with_quote_budget(Decimal::from(150));
    let (taker, step) = place(&mut engine, &ledger, market_buy);

    let trades: Vec<_> = step.trades().collect();
    assert_eq!(trades.len(), 2);
    // X fills first and completely, then Y for the remainder
    assert_eq!(trades[0].maker_order_id, OrderId::new(1));
    assert_eq!(trades[0].quantity, Quantity::from_str("1.0000").unwrap());
    assert_eq!(trades[1].maker_order_id, OrderId::new(2));
    assert_eq!(trades[1].quantity, Quantity::from_str("0.5000").unwrap());
    assert!(trades[0].seq < trades[1].seq);

    assert_eq!(taker.status, OrderStatus::Filled);

    // Y remains with 0.5 on the book
    let (best_price, best_qty) = engine.best_ask().unwrap();
    assert_eq!(best_price, Price::from_str("100.00").unwrap());
    assert_eq!(best_qty, Decimal::from_str("0.5").unwrap());
    ledger.audit().unwrap();
}

#[test]
fn post_only_rejection() {
    let (mut engine, ledger) = setup();
    let maker = AccountId::new();
    let buyer = AccountId::new();
    fund(&ledger, maker, "BTC", "1");
    fund(&ledger, buyer, "USDT", "1000");

    place(&mut engine, &ledger, limit(1, maker, Side::SELL, "99.00", "1.0000"));
    let before_ask = engine.best_ask();

    let post_only = limit(2, buyer, Side::BUY, "100.00", "1.0000").with_flags(true, false);
    let (order, step) = place(&mut engine, &ledger, post_only);

    assert_eq!(order.status, OrderStatus::Rejected(RejectReason::WouldCross));
    assert_eq!(step.trades().count(), 0);
    assert_eq!(engine.best_ask(), before_ask);
    assert!(engine.best_bid().is_none());

    // Reservation released in full
    assert_eq!(available(&ledger, buyer, "USDT"), Decimal::from(1000));
    assert_eq!(
        ledger.balance(buyer, &Asset::new("USDT")).reserved,
        Decimal::ZERO
    );
    ledger.audit().unwrap();
}

#[test]
fn ioc_partial_then_cancel() {
    let (mut engine, ledger) = setup();
    let maker = AccountId::new();
    let buyer = AccountId::new();
    fund(&ledger, maker, "BTC", "1");
    fund(&ledger, buyer, "USDT", "200");

    place(&mut engine, &ledger, limit(1, maker, Side::SELL, "100.00", "1.0000"));

    let mut ioc = limit(2, buyer, Side::BUY, "100.00", "2.0000");
    ioc.time_in_force = TimeInForce::IOC;
    let (order, step) = place(&mut engine, &ledger, ioc);

    let trades: Vec<_> = step.trades().collect();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].quantity, Quantity::from_str("1.0000").unwrap());
    assert_eq!(trades[0].price, Price::from_str("100.00").unwrap());

    assert_eq!(
        order.status,
        OrderStatus::Cancelled(CancelReason::UnfilledRemainder)
    );
    assert_eq!(order.filled_quantity, Quantity::from_str("1.0000").unwrap());

    // Nothing rested; the unspent reservation came back
    assert!(engine.best_bid().is_none());
    assert_eq!(available(&ledger, buyer, "USDT"), Decimal::from(100));
    ledger.audit().unwrap();
}

#[test]
fn fok_fail() {
    let (mut engine, ledger) = setup();
    let maker = AccountId::new();
    let buyer = AccountId::new();
    fund(&ledger, maker, "BTC", "1");
    fund(&ledger, buyer, "USDT", "200");

    place(&mut engine, &ledger, limit(1, maker, Side::SELL, "100.00", "1.0000"));

    let mut fok = limit(2, buyer, Side::BUY, "100.00", "2.0000");
    fok.time_in_force = TimeInForce::FOK;
    let (order, step) = place(&mut engine, &ledger, fok);

    assert_eq!(step.trades().count(), 0);
    assert_eq!(
        order.status,
        OrderStatus::Rejected(RejectReason::WouldNotFill)
    );
    assert_eq!(order.filled_quantity, Quantity::zero());

    // Book untouched, reservation released
    assert_eq!(
        engine.best_ask().unwrap().1,
        Decimal::from(1),
        "resting ask must be untouched"
    );
    assert_eq!(available(&ledger, buyer, "USDT"), Decimal::from(200));
    ledger.audit().unwrap();
}

#[test]
fn fok_fills_atomically_when_satisfiable() {
    let (mut engine, ledger) = setup();
    let maker = AccountId::new();
    let buyer = AccountId::new();
    fund(&ledger, maker, "BTC", "2");
    fund(&ledger, buyer, "USDT", "300");

    place(&mut engine, &ledger, limit(1, maker, Side::SELL, "100.00", "1.0000"));
    place(&mut engine, &ledger, limit(2, maker, Side::SELL, "100.00", "2.0000"));

    let mut fok = limit(3, buyer, Side::BUY, "100.00", "3.0000");
    fok.time_in_force = TimeInForce::FOK;
    let (order, step) = place(&mut engine, &ledger, fok);

    assert_eq!(order.status, OrderStatus::Filled);
    let total: Decimal = step.trades().map(|t| t.quantity.as_decimal()).sum();
    assert_eq!(total, Decimal::from(3));
    ledger.audit().unwrap();
}

#[test]
fn stop_trigger_fires_in_step_tail() {
    let (mut engine, ledger) = setup();
    let stopper = AccountId::new();
    let resting_buyer = AccountId::new();
    let ask_maker = AccountId::new();
    let taker = AccountId::new();
    fund(&ledger, stopper, "BTC", "1");
    fund(&ledger, resting_buyer, "USDT", "89");
    fund(&ledger, ask_maker, "BTC", "1");
    fund(&ledger, taker, "USDT", "89.99");

    // Liquidity the triggered stop will hit
    place(&mut engine, &ledger, limit(1, resting_buyer, Side::BUY, "89.00", "1.0000"));
    // The ask whose fill will print the trigger price
    place(&mut engine, &ledger, limit(2, ask_maker, Side::SELL, "89.99", "1.0000"));

    // Dormant stop: sell 1 when last price prints at or below 90
    let stop = Order::new(
        OrderId::new(3),
        stopper,
        Symbol::new("BTC/USDT"),
        Side::SELL,
        OrderType::StopMarket,
        Quantity::from_str("1.0000").unwrap(),
        TimeInForce::GTC,
        TS,
    )
    .with_stop(Price::from_str("90.00").unwrap(), TriggerReference::LastPrice);
    let (shelved, step) = place(&mut engine, &ledger, stop);
    assert_eq!(shelved.status, OrderStatus::Open);
    assert!(step
        .events
        .iter()
        .any(|e| matches!(e.event, EngineEvent::StopShelved { .. })));

    // Last trade prints at 89.99 → the stop fires inside the same step
    let (_, step) = place(&mut engine, &ledger, limit(4, taker, Side::BUY, "89.99", "1.0000"));

    let trades: Vec<_> = step.trades().collect();
    assert_eq!(trades.len(), 2, "trigger print and stop fill share the step");
    assert_eq!(trades[0].price, Price::from_str("89.99").unwrap());
    // The stop was resubmitted as a market sell and hit the resting bid
    assert_eq!(trades[1].taker_order_id, OrderId::new(3));
    assert_eq!(trades[1].price, Price::from_str("89.00").unwrap());

    let (outcome, _) = engine.apply(EngineCommand::Query { order_id: OrderId::new(3) }, TS + 1);
    match outcome {
        CommandOutcome::OrderSnapshot(order) => {
            assert_eq!(order.status, OrderStatus::Filled);
            assert_eq!(order.avg_fill_price, Some(Price::from_str("89.00").unwrap()));
        }
        other => panic!("expected OrderSnapshot, got {:?}", other),
    }

    assert_eq!(available(&ledger, stopper, "USDT"), Decimal::from(89));
    ledger.audit().unwrap();
}

#[test]
fn cancel_of_shelved_stop_releases_reservation() {
    let (mut engine, ledger) = setup();
    let stopper = AccountId::new();
    fund(&ledger, stopper, "BTC", "1");

    let stop = Order::new(
        OrderId::new(1),
        stopper,
        Symbol::new("BTC/USDT"),
        Side::SELL,
        OrderType::StopMarket,
        Quantity::from_str("1.0000").unwrap(),
        TimeInForce::GTC,
        TS,
    )
    .with_stop(Price::from_str("90.00").unwrap(), TriggerReference::LastPrice);
    place(&mut engine, &ledger, stop);
    assert_eq!(
        ledger.balance(stopper, &Asset::new("BTC")).reserved,
        Decimal::from(1)
    );

    let (outcome, _) = engine.apply(EngineCommand::Cancel { order_id: OrderId::new(1) }, TS + 1);
    match outcome {
        CommandOutcome::Cancelled(order) => assert_eq!(
            order.status,
            OrderStatus::Cancelled(CancelReason::UserRequested)
        ),
        other => panic!("expected Cancelled, got {:?}", other),
    }
    assert_eq!(
        ledger.balance(stopper, &Asset::new("BTC")).reserved,
        Decimal::ZERO
    );
    ledger.audit().unwrap();
}

#[test]
fn mark_price_stop_triggers_via_queue_command() {
    let (mut engine, ledger) = setup();
    let stopper = AccountId::new();
    let resting_buyer = AccountId::new();
    fund(&ledger, stopper, "BTC", "1");
    fund(&ledger, resting_buyer, "USDT", "89");

    place(&mut engine, &ledger, limit(1, resting_buyer, Side::BUY, "89.00", "1.0000"));

    let stop = Order::new(
        OrderId::new(2),
        stopper,
        Symbol::new("BTC/USDT"),
        Side::SELL,
        OrderType::StopMarket,
        Quantity::from_str("1.0000").unwrap(),
        TimeInForce::GTC,
        TS,
    )
    .with_stop(Price::from_str("90.00").unwrap(), TriggerReference::MarkPrice);
    place(&mut engine, &ledger, stop);

    // Mark update above the trigger leaves the stop dormant
    let (_, step) = engine.apply(
        EngineCommand::MarkPrice(Price::from_str("95.00").unwrap()),
        TS + 1,
    );
    assert_eq!(step.trades().count(), 0);

    // Mark at the trigger fires it
    let (_, step) = engine.apply(
        EngineCommand::MarkPrice(Price::from_str("90.00").unwrap()),
        TS + 2,
    );
    let trades: Vec<_> = step.trades().collect();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].taker_order_id, OrderId::new(2));
    ledger.audit().unwrap();
}
