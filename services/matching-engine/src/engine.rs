//! Symbol engine
//!
//! One `SymbolEngine` owns one symbol's book, stop shelf, expiry queue, and
//! event sequence. The hosting task applies commands one at a time; each
//! command yields a `MatchStep` that must be committed before the next
//! command is applied.
//!
//! Settlement runs inside the match loop against the shared ledger. A
//! fatal ledger error (reserved underflow) halts this engine permanently:
//! it emits `SymbolHalted` and refuses further commands, while every other
//! symbol continues.

use crate::book::{AskBook, BidBook, PriceLevel, RestingEntry};
use crate::events::{EngineEvent, MatchStep, SeqEvent};
use crate::expiry::ExpiryQueue;
use crate::matching::crossing;
use crate::matching::executor::MatchExecutor;
use crate::shelf::StopShelf;
use ledger::Ledger;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use types::errors::{LedgerError, OrderError};
use types::ids::OrderId;
use types::market::{Asset, Symbol, SymbolConfig};
use types::numeric::{Price, Quantity};
use types::order::{
    CancelReason, Order, OrderStatus, OrderType, RejectReason, Side, TimeInForce, TriggerReference,
};

/// Commands accepted by a symbol engine, in queue-arrival order.
#[derive(Debug, Clone)]
pub enum EngineCommand {
    /// Place an order whose reservation was already taken by the gateway.
    Place { order: Order, reserved: Decimal },
    Cancel { order_id: OrderId },
    Query { order_id: OrderId },
    /// Mark price update, delivered through the same queue so stop
    /// evaluation preserves command ordering.
    MarkPrice(Price),
}

/// Result of applying one command.
#[derive(Debug, Clone)]
pub enum CommandOutcome {
    /// Order snapshot after processing (may already be terminal).
    Placed(Box<Order>),
    /// Terminal snapshot after a cancel; repeated cancels return the same
    /// terminal state.
    Cancelled(Box<Order>),
    OrderSnapshot(Box<Order>),
    MarkPriceApplied,
    NotFound,
    /// The engine is halted; the command was not applied.
    Halted,
}

/// Book-side state the engine keeps per admitted order.
#[derive(Debug, Clone)]
struct OrderState {
    order: Order,
    reserve_asset: Asset,
    /// Portion of the original reservation not yet consumed by fills.
    /// Released exactly once, on the terminal transition.
    reserved_remaining: Decimal,
}

/// Compute the reservation an order requires before it may enter the book.
///
/// Buys reserve quote: notional plus the taker-fee cap for limit prices, or
/// the caller-supplied `quote_budget` for market orders. Sells reserve the
/// base quantity.
pub fn reservation_for(config: &SymbolConfig, order: &Order) -> Result<(Asset, Decimal), OrderError> {
    match order.side {
        Side::SELL => Ok((config.symbol.base(), order.quantity.as_decimal())),
        Side::BUY => match order.order_type {
            OrderType::Limit | OrderType::StopLimit => {
                let price = order
                    .price
                    .ok_or_else(|| OrderError::InvalidPrice("price required".into()))?;
                let notional = order.quantity * price;
                let fee_cap = config.fees.taker_fee(notional, config.price_tick);
                Ok((config.symbol.quote(), notional + fee_cap))
            }
            OrderType::Market | OrderType::StopMarket => {
                let budget = order.quote_budget.ok_or_else(|| {
                    OrderError::InvalidQty("quote_budget required for market buys".into())
                })?;
                Ok((config.symbol.quote(), budget))
            }
        },
    }
}

/// Serializable view of the engine's authoritative state, used for replay
/// equivalence digests.
#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub symbol: Symbol,
    pub seq: u64,
    pub next_trade_id: u64,
    pub last_price: Option<Price>,
    pub bids: Vec<(Price, Vec<RestingEntry>)>,
    pub asks: Vec<(Price, Vec<RestingEntry>)>,
    pub stops: Vec<(TriggerReference, Side, Price, OrderId)>,
}

pub struct SymbolEngine {
    config: SymbolConfig,
    ledger: Arc<Ledger>,
    bids: BidBook,
    asks: AskBook,
    orders: HashMap<OrderId, OrderState>,
    /// Stops triggered by the last traded price
    last_shelf: StopShelf,
    /// Stops triggered by the externally supplied mark price
    mark_shelf: StopShelf,
    expiry: ExpiryQueue,
    executor: MatchExecutor,
    /// Last assigned per-symbol event sequence
    seq: u64,
    /// Highest order id this engine has seen (for id allocation after
    /// recovery)
    max_order_id: u64,
    last_price: Option<Price>,
    mark_price: Option<Price>,
    halted: bool,
}

impl SymbolEngine {
    pub fn new(config: SymbolConfig, ledger: Arc<Ledger>) -> Self {
        Self {
            config,
            ledger,
            bids: BidBook::new(),
            asks: AskBook::new(),
            orders: HashMap::new(),
            last_shelf: StopShelf::new(),
            mark_shelf: StopShelf::new(),
            expiry: ExpiryQueue::new(),
            executor: MatchExecutor::new(1),
            seq: 0,
            max_order_id: 0,
            last_price: None,
            mark_price: None,
            halted: false,
        }
    }

    pub fn config(&self) -> &SymbolConfig {
        &self.config
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn last_price(&self) -> Option<Price> {
        self.last_price
    }

    /// Highest order id observed, live or during replay.
    pub fn max_order_id(&self) -> u64 {
        self.max_order_id
    }

    /// Non-terminal orders with their owners (router rebuild after
    /// recovery).
    pub fn open_orders(&self) -> Vec<(OrderId, types::ids::AccountId)> {
        let mut open: Vec<_> = self
            .orders
            .values()
            .filter(|state| !state.order.status.is_terminal())
            .map(|state| (state.order.order_id, state.order.account_id))
            .collect();
        open.sort_by_key(|(order_id, _)| *order_id);
        open
    }

    pub fn best_bid(&self) -> Option<(Price, Decimal)> {
        self.bids.best_bid()
    }

    pub fn best_ask(&self) -> Option<(Price, Decimal)> {
        self.asks.best_ask()
    }

    /// Apply one command and return its outcome together with the step of
    /// events it produced. The caller commits the step before the next
    /// command.
    pub fn apply(&mut self, command: EngineCommand, now_ns: i64) -> (CommandOutcome, MatchStep) {
        let mut step = MatchStep::new(self.config.symbol.clone());

        if self.halted {
            return (CommandOutcome::Halted, step);
        }

        // GTD deadlines are evaluated at the head of the queue, before the
        // command itself.
        if let Err(err) = self.expire_due(now_ns, &mut step) {
            self.halt(err, now_ns, &mut step);
            return (CommandOutcome::Halted, step);
        }

        let result = match command {
            EngineCommand::Place { order, reserved } => self.place(order, reserved, now_ns, &mut step),
            EngineCommand::Cancel { order_id } => self.cancel(order_id, now_ns, &mut step),
            EngineCommand::Query { order_id } => Ok(match self.orders.get(&order_id) {
                Some(state) => CommandOutcome::OrderSnapshot(Box::new(state.order.clone())),
                None => CommandOutcome::NotFound,
            }),
            EngineCommand::MarkPrice(price) => {
                self.mark_price = Some(price);
                Ok(CommandOutcome::MarkPriceApplied)
            }
        };

        let result = result.and_then(|outcome| {
            self.drain_triggered_stops(now_ns, &mut step)?;
            Ok(outcome)
        });

        match result {
            Ok(outcome) => {
                debug_assert!(self.book_not_crossed(), "book crossed after step");
                (outcome, step)
            }
            Err(err) => {
                self.halt(err, now_ns, &mut step);
                (CommandOutcome::Halted, step)
            }
        }
    }

    // ── Placement ───────────────────────────────────────────────────

    fn place(
        &mut self,
        mut order: Order,
        reserved: Decimal,
        now_ns: i64,
        step: &mut MatchStep,
    ) -> Result<CommandOutcome, LedgerError> {
        debug_assert!(
            !self.orders.contains_key(&order.order_id),
            "order ids are unique"
        );
        self.max_order_id = self.max_order_id.max(order.order_id.value());
        order.created_seq = self.seq + 1;

        match order.order_type {
            OrderType::StopLimit | OrderType::StopMarket => {
                self.place_stop(order, reserved, now_ns, step)
            }
            OrderType::Limit | OrderType::Market => {
                self.place_executable(order, reserved, now_ns, step)
            }
        }
    }

    fn place_stop(
        &mut self,
        order: Order,
        reserved: Decimal,
        now_ns: i64,
        step: &mut MatchStep,
    ) -> Result<CommandOutcome, LedgerError> {
        let stop_price = order.stop_price.expect("stop orders carry a stop price");
        let trigger = order.trigger.unwrap_or(TriggerReference::LastPrice);

        let reference = match trigger {
            TriggerReference::LastPrice => self.last_price,
            TriggerReference::MarkPrice => self.mark_price,
        };
        if let Some(reference) = reference {
            if Self::stop_condition_met(order.side, stop_price, reference) {
                // Already marketable: convert without shelving
                return self.place_executable(Self::convert_stop(order), reserved, now_ns, step);
            }
        }

        match trigger {
            TriggerReference::LastPrice => {
                self.last_shelf.shelve(order.side, stop_price, order.order_id)
            }
            TriggerReference::MarkPrice => {
                self.mark_shelf.shelve(order.side, stop_price, order.order_id)
            }
        };

        step.push(
            &mut self.seq,
            now_ns,
            EngineEvent::StopShelved {
                order_id: order.order_id,
                account_id: order.account_id,
                side: order.side,
                order_type: order.order_type,
                stop_price,
                trigger,
                price: order.price,
                quantity: order.quantity,
                time_in_force: order.time_in_force,
                reserved_remaining: reserved,
            },
        );

        let reserve_asset = self.reserve_asset_for(order.side);
        let order_id = order.order_id;
        self.orders.insert(
            order_id,
            OrderState {
                order: order.clone(),
                reserve_asset,
                reserved_remaining: reserved,
            },
        );
        self.push_order_update(order_id, now_ns, step);

        Ok(CommandOutcome::Placed(Box::new(order)))
    }

    fn place_executable(
        &mut self,
        mut order: Order,
        reserved: Decimal,
        now_ns: i64,
        step: &mut MatchStep,
    ) -> Result<CommandOutcome, LedgerError> {
        let reserve_asset = self.reserve_asset_for(order.side);

        // Post-only orders must never take liquidity
        if order.post_only && self.would_cross(&order) {
            return self.reject(order, reserve_asset, reserved, RejectReason::WouldCross, now_ns, step);
        }

        // FOK: probe before mutating anything
        if order.time_in_force == TimeInForce::FOK && !self.fok_satisfiable(&order) {
            return self.reject(
                order,
                reserve_asset,
                reserved,
                RejectReason::WouldNotFill,
                now_ns,
                step,
            );
        }

        let order_id = order.order_id;
        let mut taker = OrderState {
            order,
            reserve_asset,
            reserved_remaining: reserved,
        };

        self.match_incoming(&mut taker, now_ns, step)?;
        self.finish_taker(&mut taker, now_ns, step);

        let terminal = taker.order.status.is_terminal();
        self.orders.insert(order_id, taker);
        self.push_order_update(order_id, now_ns, step);
        if terminal {
            self.release_terminal(order_id, now_ns, step)?;
        }

        let snapshot = self
            .orders
            .get(&order_id)
            .map(|state| state.order.clone())
            .expect("taker state was just inserted");
        Ok(CommandOutcome::Placed(Box::new(snapshot)))
    }

    /// Walk the opposite side from best toward worse, filling against
    /// resting orders in price-time priority.
    fn match_incoming(
        &mut self,
        taker: &mut OrderState,
        now_ns: i64,
        step: &mut MatchStep,
    ) -> Result<(), LedgerError> {
        let side = taker.order.side;
        let mut budget = if taker.order.order_type == OrderType::Market && side == Side::BUY {
            Some(
                taker
                    .order
                    .quote_budget
                    .expect("market buys carry a quote budget"),
            )
        } else {
            None
        };

        loop {
            if taker.order.remaining_quantity.is_zero() {
                break;
            }

            let best = match side {
                Side::BUY => self.asks.best_front(),
                Side::SELL => self.bids.best_front(),
            };
            let Some((level_price, front)) = best else {
                break;
            };

            // Price guard (market orders walk without one)
            if let Some(limit) = taker.order.price {
                if !crossing::incoming_can_match(side, limit, level_price) {
                    break;
                }
            }

            // Self-trade prevention: cancel the older resting order, then
            // continue against the rest of the book.
            if front.account_id == taker.order.account_id {
                self.remove_resting(
                    front.order_id,
                    CancelReason::SelfTradePrevented,
                    now_ns,
                    step,
                )?;
                continue;
            }

            let mut fill = taker.order.remaining_quantity.min(front.remaining_quantity);
            if let Some(remaining_budget) = budget {
                // Bound the fill so notional + taker fee stays inside the
                // budget; the rate bound is conservative w.r.t. flooring.
                let unit_cost =
                    level_price.as_decimal() * (Decimal::ONE + self.config.fees.taker_rate);
                let affordable = Quantity::floor_to_step(remaining_budget / unit_cost, self.config.qty_step);
                fill = fill.min(affordable);
                if fill.is_zero() {
                    break;
                }
            }

            // Execute at the maker's price. The sequence is only consumed
            // once settlement succeeds, so a halt leaves no gap in the log.
            let seq = self.seq + 1;
            let trade = self.executor.execute_trade(
                &self.config,
                seq,
                front.order_id,
                front.account_id,
                taker.order.order_id,
                taker.order.account_id,
                side,
                level_price,
                fill,
                now_ns,
            );
            let balance_changes = self.ledger.settle(&trade, &self.config)?;
            self.seq = seq;
            self.last_price = Some(level_price);

            step.events.push(SeqEvent {
                seq,
                ts_ns: now_ns,
                event: EngineEvent::Trade(trade.clone()),
            });

            let level_total = match side {
                Side::BUY => self.asks.reduce_front(level_price, fill),
                Side::SELL => self.bids.reduce_front(level_price, fill),
            };
            step.push(
                &mut self.seq,
                now_ns,
                EngineEvent::BookDelta {
                    side: side.opposite(),
                    price: level_price,
                    size: level_total,
                },
            );

            // Maker bookkeeping
            let maker_cost = match side {
                // Taker buys → maker sold base
                Side::BUY => fill.as_decimal(),
                // Taker sells → maker bought with quote
                Side::SELL => trade.notional() + trade.maker_fee,
            };
            let maker_filled = {
                let maker = self
                    .orders
                    .get_mut(&front.order_id)
                    .expect("resting maker is indexed");
                maker.order.add_fill(fill, level_price, now_ns);
                maker.reserved_remaining -= maker_cost;
                maker.order.is_filled()
            };
            self.push_order_update(front.order_id, now_ns, step);

            // Taker bookkeeping
            let taker_cost = match side {
                Side::BUY => trade.notional() + trade.taker_fee,
                Side::SELL => fill.as_decimal(),
            };
            taker.order.add_fill(fill, level_price, now_ns);
            taker.reserved_remaining -= taker_cost;
            if let Some(remaining_budget) = budget {
                budget = Some(remaining_budget - taker_cost);
            }

            for change in balance_changes {
                step.push(&mut self.seq, now_ns, EngineEvent::BalanceUpdate(change));
            }

            if maker_filled {
                self.release_terminal(front.order_id, now_ns, step)?;
            }
        }

        Ok(())
    }

    /// Rest the remainder, or cancel it for order types that never rest.
    fn finish_taker(&mut self, taker: &mut OrderState, now_ns: i64, step: &mut MatchStep) {
        if taker.order.remaining_quantity.is_zero() {
            return;
        }

        let rests = taker.order.order_type == OrderType::Limit
            && matches!(taker.order.time_in_force, TimeInForce::GTC | TimeInForce::GTD(_));
        if !rests {
            taker.order.cancel(CancelReason::UnfilledRemainder, now_ns);
            return;
        }

        let price = taker.order.price.expect("limit orders have a price");
        let arrival_seq = step.push(
            &mut self.seq,
            now_ns,
            EngineEvent::OrderAccepted {
                order_id: taker.order.order_id,
                account_id: taker.order.account_id,
                side: taker.order.side,
                price,
                quantity: taker.order.remaining_quantity,
                time_in_force: taker.order.time_in_force,
                reserved_remaining: taker.reserved_remaining,
            },
        );
        let entry = RestingEntry {
            order_id: taker.order.order_id,
            account_id: taker.order.account_id,
            remaining_quantity: taker.order.remaining_quantity,
            arrival_seq,
        };
        let level_total = match taker.order.side {
            Side::BUY => self.bids.insert(price, entry),
            Side::SELL => self.asks.insert(price, entry),
        };
        step.push(
            &mut self.seq,
            now_ns,
            EngineEvent::BookDelta {
                side: taker.order.side,
                price,
                size: level_total,
            },
        );

        if let TimeInForce::GTD(deadline) = taker.order.time_in_force {
            self.expiry.push(deadline, taker.order.order_id);
        }
    }

    fn reject(
        &mut self,
        mut order: Order,
        reserve_asset: Asset,
        reserved: Decimal,
        reason: RejectReason,
        now_ns: i64,
        step: &mut MatchStep,
    ) -> Result<CommandOutcome, LedgerError> {
        order.reject(reason, now_ns);
        let change = self
            .ledger
            .release(order.account_id, reserve_asset, reserved)?;
        step.push(&mut self.seq, now_ns, EngineEvent::BalanceUpdate(change));
        step.push(
            &mut self.seq,
            now_ns,
            EngineEvent::OrderUpdate {
                order_id: order.order_id,
                account_id: order.account_id,
                status: order.status,
                filled_quantity: order.filled_quantity,
                avg_fill_price: order.avg_fill_price,
            },
        );
        Ok(CommandOutcome::Placed(Box::new(order)))
    }

    // ── Cancellation ────────────────────────────────────────────────

    fn cancel(
        &mut self,
        order_id: OrderId,
        now_ns: i64,
        step: &mut MatchStep,
    ) -> Result<CommandOutcome, LedgerError> {
        let shelved: Option<(Side, Price, TriggerReference)> = {
            let Some(state) = self.orders.get(&order_id) else {
                return Ok(CommandOutcome::NotFound);
            };
            // A cancel that raced a fill is a no-op returning the terminal
            // state
            if state.order.status.is_terminal() {
                return Ok(CommandOutcome::Cancelled(Box::new(state.order.clone())));
            }
            match state.order.order_type {
                OrderType::StopLimit | OrderType::StopMarket => Some((
                    state.order.side,
                    state.order.stop_price.expect("stop orders carry a stop price"),
                    state.order.trigger.unwrap_or(TriggerReference::LastPrice),
                )),
                _ => None,
            }
        };

        match shelved {
            Some((side, stop_price, trigger)) => {
                let removed = match trigger {
                    TriggerReference::LastPrice => {
                        self.last_shelf.remove(side, stop_price, &order_id)
                    }
                    TriggerReference::MarkPrice => {
                        self.mark_shelf.remove(side, stop_price, &order_id)
                    }
                };
                debug_assert!(removed, "open stop orders sit on their shelf");
                self.finish_cancel(order_id, CancelReason::UserRequested, now_ns, step)?;
            }
            None => {
                self.remove_resting(order_id, CancelReason::UserRequested, now_ns, step)?;
            }
        }

        let snapshot = self
            .orders
            .get(&order_id)
            .map(|state| state.order.clone())
            .expect("cancelled order keeps its snapshot");
        Ok(CommandOutcome::Cancelled(Box::new(snapshot)))
    }

    /// Unlink a resting order from its price level, then finish the cancel.
    fn remove_resting(
        &mut self,
        order_id: OrderId,
        reason: CancelReason,
        now_ns: i64,
        step: &mut MatchStep,
    ) -> Result<(), LedgerError> {
        let (side, price) = {
            let state = self.orders.get(&order_id).expect("resting order is indexed");
            (
                state.order.side,
                state.order.price.expect("resting orders have a price"),
            )
        };

        let removed = match side {
            Side::BUY => self.bids.remove(&order_id, price),
            Side::SELL => self.asks.remove(&order_id, price),
        };
        if let Some((_, level_total)) = removed {
            step.push(
                &mut self.seq,
                now_ns,
                EngineEvent::BookDelta {
                    side,
                    price,
                    size: level_total,
                },
            );
        }

        self.finish_cancel(order_id, reason, now_ns, step)
    }

    /// Mark cancelled, release the outstanding reservation exactly once,
    /// and emit the terminal order update.
    fn finish_cancel(
        &mut self,
        order_id: OrderId,
        reason: CancelReason,
        now_ns: i64,
        step: &mut MatchStep,
    ) -> Result<(), LedgerError> {
        let (account_id, asset, leftover) = {
            let state = self.orders.get_mut(&order_id).expect("order is indexed");
            state.order.cancel(reason, now_ns);
            let leftover = state.reserved_remaining;
            state.reserved_remaining = Decimal::ZERO;
            (state.order.account_id, state.reserve_asset.clone(), leftover)
        };

        if leftover < Decimal::ZERO {
            return Err(LedgerError::Inconsistent {
                detail: format!("negative reservation remainder on order {}", order_id),
            });
        }
        if leftover > Decimal::ZERO {
            let change = self.ledger.release(account_id, asset, leftover)?;
            step.push(&mut self.seq, now_ns, EngineEvent::BalanceUpdate(change));
        }

        self.push_order_update(order_id, now_ns, step);
        Ok(())
    }

    /// Release the unused reservation of an order that just went terminal.
    fn release_terminal(
        &mut self,
        order_id: OrderId,
        now_ns: i64,
        step: &mut MatchStep,
    ) -> Result<(), LedgerError> {
        let (account_id, asset, leftover) = {
            let state = self.orders.get_mut(&order_id).expect("order is indexed");
            let leftover = state.reserved_remaining;
            state.reserved_remaining = Decimal::ZERO;
            (state.order.account_id, state.reserve_asset.clone(), leftover)
        };

        if leftover < Decimal::ZERO {
            return Err(LedgerError::Inconsistent {
                detail: format!("negative reservation remainder on order {}", order_id),
            });
        }
        if leftover > Decimal::ZERO {
            let change = self.ledger.release(account_id, asset, leftover)?;
            step.push(&mut self.seq, now_ns, EngineEvent::BalanceUpdate(change));
        }
        Ok(())
    }

    // ── Stops and expiry ────────────────────────────────────────────

    fn stop_condition_met(side: Side, stop_price: Price, reference: Price) -> bool {
        match side {
            Side::BUY => reference >= stop_price,
            Side::SELL => reference <= stop_price,
        }
    }

    fn convert_stop(mut order: Order) -> Order {
        order.order_type = match order.order_type {
            OrderType::StopLimit => OrderType::Limit,
            OrderType::StopMarket => OrderType::Market,
            other => other,
        };
        order
    }

    /// Fire every triggered stop, in shelf-arrival order, until the
    /// reference prices stop moving. Triggered stops execute inside the
    /// current step, before the next queued command.
    fn drain_triggered_stops(
        &mut self,
        now_ns: i64,
        step: &mut MatchStep,
    ) -> Result<(), LedgerError> {
        loop {
            let mut triggered: Vec<OrderId> = Vec::new();
            if let Some(last) = self.last_price {
                triggered.extend(self.last_shelf.take_triggered(last));
            }
            if let Some(mark) = self.mark_price {
                triggered.extend(self.mark_shelf.take_triggered(mark));
            }
            if triggered.is_empty() {
                return Ok(());
            }

            for order_id in triggered {
                let Some(state) = self.orders.get(&order_id) else {
                    continue;
                };
                if state.order.status.is_terminal() {
                    continue;
                }
                let reserved = state.reserved_remaining;
                let converted = Self::convert_stop(state.order.clone());
                tracing::debug!(order_id = %order_id, "stop triggered");
                self.place_executable(converted, reserved, now_ns, step)?;
            }
        }
    }

    fn expire_due(&mut self, now_ns: i64, step: &mut MatchStep) -> Result<(), LedgerError> {
        for order_id in self.expiry.pop_due(now_ns) {
            let still_open = self
                .orders
                .get(&order_id)
                .map(|state| !state.order.status.is_terminal())
                .unwrap_or(false);
            if still_open {
                self.remove_resting(order_id, CancelReason::Expired, now_ns, step)?;
            }
        }
        Ok(())
    }

    // ── Probes and helpers ──────────────────────────────────────────

    fn would_cross(&self, order: &Order) -> bool {
        let Some(limit) = order.price else {
            return true;
        };
        match order.side {
            Side::BUY => self
                .asks
                .best_ask_price()
                .map(|ask| limit >= ask)
                .unwrap_or(false),
            Side::SELL => self
                .bids
                .best_bid_price()
                .map(|bid| limit <= bid)
                .unwrap_or(false),
        }
    }

    /// Whether the full quantity is satisfiable at prices the order allows,
    /// ignoring the order's own resting liquidity (which self-trade
    /// prevention would cancel, not fill).
    fn fok_satisfiable(&self, order: &Order) -> bool {
        let needed = order.remaining_quantity.as_decimal();
        let mut available = Decimal::ZERO;

        let levels: Box<dyn Iterator<Item = (&Price, &PriceLevel)>> = match order.side {
            Side::BUY => Box::new(self.asks.levels_from_best()),
            Side::SELL => Box::new(self.bids.levels_from_best()),
        };
        for (price, level) in levels {
            if let Some(limit) = order.price {
                if !crossing::incoming_can_match(order.side, limit, *price) {
                    break;
                }
            }
            for entry in level.iter() {
                if entry.account_id != order.account_id {
                    available += entry.remaining_quantity.as_decimal();
                }
            }
            if available >= needed {
                return true;
            }
        }
        available >= needed
    }

    fn reserve_asset_for(&self, side: Side) -> Asset {
        match side {
            Side::BUY => self.config.symbol.quote(),
            Side::SELL => self.config.symbol.base(),
        }
    }

    fn push_order_update(&mut self, order_id: OrderId, now_ns: i64, step: &mut MatchStep) {
        let (account_id, status, filled_quantity, avg_fill_price) = {
            let state = self.orders.get(&order_id).expect("order is indexed");
            (
                state.order.account_id,
                state.order.status,
                state.order.filled_quantity,
                state.order.avg_fill_price,
            )
        };
        step.push(
            &mut self.seq,
            now_ns,
            EngineEvent::OrderUpdate {
                order_id,
                account_id,
                status,
                filled_quantity,
                avg_fill_price,
            },
        );
    }

    fn halt(&mut self, err: LedgerError, now_ns: i64, step: &mut MatchStep) {
        self.halted = true;
        tracing::error!(symbol = %self.config.symbol, error = %err, "symbol halted");
        step.push(
            &mut self.seq,
            now_ns,
            EngineEvent::SymbolHalted {
                detail: err.to_string(),
            },
        );
    }

    fn book_not_crossed(&self) -> bool {
        match (self.bids.best_bid_price(), self.asks.best_ask_price()) {
            (Some(bid), Some(ask)) => bid < ask,
            _ => true,
        }
    }

    // ── Recovery ────────────────────────────────────────────────────

    /// Drop an order's shelf record if its current state is a dormant stop
    /// (replay of a stop that converted live).
    fn unshelve_if_stop(&mut self, order_id: &OrderId) {
        let shelved = match self.orders.get(order_id) {
            Some(state)
                if matches!(
                    state.order.order_type,
                    OrderType::StopLimit | OrderType::StopMarket
                ) =>
            {
                state.order.stop_price.map(|stop_price| {
                    (
                        state.order.side,
                        stop_price,
                        state.order.trigger.unwrap_or(TriggerReference::LastPrice),
                    )
                })
            }
            _ => None,
        };
        if let Some((side, stop_price, trigger)) = shelved {
            match trigger {
                TriggerReference::LastPrice => self.last_shelf.remove(side, stop_price, order_id),
                TriggerReference::MarkPrice => self.mark_shelf.remove(side, stop_price, order_id),
            };
        }
    }

    /// Re-apply one logged event during recovery. Events must arrive in
    /// sequence order; nothing is re-emitted.
    pub fn restore_event(&mut self, logged: &SeqEvent) {
        match &logged.event {
            EngineEvent::OrderAccepted { order_id, .. }
            | EngineEvent::StopShelved { order_id, .. }
            | EngineEvent::OrderUpdate { order_id, .. } => {
                self.max_order_id = self.max_order_id.max(order_id.value());
            }
            EngineEvent::Trade(trade) => {
                self.max_order_id = self
                    .max_order_id
                    .max(trade.maker_order_id.value())
                    .max(trade.taker_order_id.value());
            }
            _ => {}
        }

        match &logged.event {
            EngineEvent::OrderAccepted {
                order_id,
                account_id,
                side,
                price,
                quantity,
                time_in_force,
                reserved_remaining,
            } => {
                // A stop that triggered and came to rest replaces its
                // shelved record.
                self.unshelve_if_stop(order_id);
                let order = Order::new(
                    *order_id,
                    *account_id,
                    self.config.symbol.clone(),
                    *side,
                    OrderType::Limit,
                    *quantity,
                    *time_in_force,
                    logged.ts_ns,
                )
                .with_price(*price);
                let entry = RestingEntry {
                    order_id: *order_id,
                    account_id: *account_id,
                    remaining_quantity: *quantity,
                    arrival_seq: logged.seq,
                };
                match side {
                    Side::BUY => self.bids.insert(*price, entry),
                    Side::SELL => self.asks.insert(*price, entry),
                };
                let reserve_asset = self.reserve_asset_for(*side);
                self.orders.insert(
                    *order_id,
                    OrderState {
                        order,
                        reserve_asset,
                        reserved_remaining: *reserved_remaining,
                    },
                );
                if let TimeInForce::GTD(deadline) = time_in_force {
                    self.expiry.push(*deadline, *order_id);
                }
            }

            EngineEvent::StopShelved {
                order_id,
                account_id,
                side,
                order_type,
                stop_price,
                trigger,
                price,
                quantity,
                time_in_force,
                reserved_remaining,
            } => {
                let mut order = Order::new(
                    *order_id,
                    *account_id,
                    self.config.symbol.clone(),
                    *side,
                    *order_type,
                    *quantity,
                    *time_in_force,
                    logged.ts_ns,
                )
                .with_stop(*stop_price, *trigger);
                if let Some(price) = price {
                    order = order.with_price(*price);
                }
                match trigger {
                    TriggerReference::LastPrice => {
                        self.last_shelf.shelve(*side, *stop_price, *order_id)
                    }
                    TriggerReference::MarkPrice => {
                        self.mark_shelf.shelve(*side, *stop_price, *order_id)
                    }
                };
                let reserve_asset = self.reserve_asset_for(*side);
                self.orders.insert(
                    *order_id,
                    OrderState {
                        order,
                        reserve_asset,
                        reserved_remaining: *reserved_remaining,
                    },
                );
            }

            EngineEvent::Trade(trade) => {
                self.last_price = Some(trade.price);
                self.executor
                    .set_next_trade_id(trade.trade_id.value() + 1);
                let maker_side = if let Some(maker) = self.orders.get_mut(&trade.maker_order_id) {
                    let maker_side = maker.order.side;
                    maker.order.add_fill(trade.quantity, trade.price, trade.timestamp_ns);
                    let maker_cost = match maker_side {
                        Side::BUY => trade.notional() + trade.maker_fee,
                        Side::SELL => trade.quantity.as_decimal(),
                    };
                    maker.reserved_remaining -= maker_cost;
                    if maker.order.status.is_terminal() {
                        maker.reserved_remaining = Decimal::ZERO;
                    }
                    Some(maker_side)
                } else {
                    None
                };
                match maker_side {
                    Some(Side::BUY) => {
                        self.bids.reduce_front(trade.price, trade.quantity);
                    }
                    Some(Side::SELL) => {
                        self.asks.reduce_front(trade.price, trade.quantity);
                    }
                    None => {}
                }
            }

            EngineEvent::OrderUpdate {
                order_id, status, ..
            } => {
                if status.is_terminal() {
                    let unlink = match self.orders.get_mut(order_id) {
                        Some(state) if !state.order.status.is_terminal() => {
                            let side = state.order.side;
                            let price = state.order.price;
                            let stop = state.order.stop_price;
                            let trigger = state.order.trigger.unwrap_or(TriggerReference::LastPrice);
                            let is_stop = matches!(
                                state.order.order_type,
                                OrderType::StopLimit | OrderType::StopMarket
                            );
                            state.order.status = *status;
                            state.order.updated_at = logged.ts_ns;
                            state.reserved_remaining = Decimal::ZERO;
                            Some((side, price, stop, trigger, is_stop))
                        }
                        _ => None,
                    };

                    if let Some((side, price, stop, trigger, is_stop)) = unlink {
                        if is_stop {
                            if let Some(stop_price) = stop {
                                match trigger {
                                    TriggerReference::LastPrice => {
                                        self.last_shelf.remove(side, stop_price, order_id)
                                    }
                                    TriggerReference::MarkPrice => {
                                        self.mark_shelf.remove(side, stop_price, order_id)
                                    }
                                };
                            }
                        } else if let Some(price) = price {
                            match side {
                                Side::BUY => self.bids.remove(order_id, price),
                                Side::SELL => self.asks.remove(order_id, price),
                            };
                        }
                    }
                }
            }

            // The book is rebuilt from accepts/trades/cancels; deltas are
            // derived data.
            EngineEvent::BookDelta { .. } => {}

            EngineEvent::BalanceUpdate(change) => {
                self.ledger.restore(
                    change.account_id,
                    change.asset.clone(),
                    change.available,
                    change.reserved,
                );
            }

            EngineEvent::SymbolHalted { .. } => {
                self.halted = true;
            }
        }

        self.seq = self.seq.max(logged.seq);
    }

    /// Serializable state view for replay-equivalence digests.
    pub fn snapshot(&self) -> EngineSnapshot {
        let bids = self
            .bids
            .levels_from_best()
            .map(|(price, level)| (*price, level.iter().cloned().collect()))
            .collect();
        let asks = self
            .asks
            .levels_from_best()
            .map(|(price, level)| (*price, level.iter().cloned().collect()))
            .collect();

        let mut stops: Vec<(TriggerReference, Side, Price, OrderId)> = Vec::new();
        for (side, price, shelved) in self.last_shelf.snapshot() {
            stops.push((TriggerReference::LastPrice, side, price, shelved.order_id));
        }
        for (side, price, shelved) in self.mark_shelf.snapshot() {
            stops.push((TriggerReference::MarkPrice, side, price, shelved.order_id));
        }

        EngineSnapshot {
            symbol: self.config.symbol.clone(),
            seq: self.seq,
            next_trade_id: self.executor.next_trade_id(),
            last_price: self.last_price,
            bids,
            asks,
            stops,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger::FundingReason;
    use rust_decimal::prelude::FromStr;
    use types::fee::FeeSchedule;
    use types::ids::AccountId;

    const TS: i64 = 1708123456789000000;

    fn config() -> SymbolConfig {
        SymbolConfig::new(
            Symbol::new("BTC/USDT"),
            Decimal::from_str("0.01").unwrap(),
            Decimal::from_str("0.0001").unwrap(),
            FeeSchedule::zero(),
        )
    }

    fn engine() -> (SymbolEngine, Arc<Ledger>) {
        let ledger = Arc::new(Ledger::new(AccountId::new()));
        (SymbolEngine::new(config(), ledger.clone()), ledger)
    }

    fn fund(ledger: &Ledger, account: AccountId, asset: &str, amount: u64) {
        ledger
            .credit(
                account,
                Asset::new(asset),
                Decimal::from(amount),
                FundingReason::Deposit,
            )
            .unwrap();
    }

    fn limit_order(id: u64, account: AccountId, side: Side, price: u64, qty: &str) -> Order {
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
        .with_price(Price::from_u64(price))
    }

    fn place(engine: &mut SymbolEngine, ledger: &Ledger, order: Order) -> (CommandOutcome, MatchStep) {
        let (asset, reserved) = reservation_for(engine.config(), &order).unwrap();
        ledger.reserve(order.account_id, asset, reserved).unwrap();
        engine.apply(EngineCommand::Place { order, reserved }, TS)
    }

    #[test]
    fn test_resting_order_emits_accept_and_delta() {
        let (mut engine, ledger) = engine();
        let buyer = AccountId::new();
        fund(&ledger, buyer, "USDT", 100_000);

        let (outcome, step) = place(&mut engine, &ledger, limit_order(1, buyer, Side::BUY, 50000, "1.0"));

        match outcome {
            CommandOutcome::Placed(order) => assert_eq!(order.status, OrderStatus::Open),
            other => panic!("expected Placed, got {:?}", other),
        }
        assert!(step
            .events
            .iter()
            .any(|e| matches!(e.event, EngineEvent::OrderAccepted { .. })));
        assert_eq!(engine.best_bid().unwrap().0, Price::from_u64(50000));
    }

    #[test]
    fn test_full_match_settles_and_clears_book() {
        let (mut engine, ledger) = engine();
        let seller = AccountId::new();
        let buyer = AccountId::new();
        fund(&ledger, seller, "BTC", 1);
        fund(&ledger, buyer, "USDT", 50_000);

        place(&mut engine, &ledger, limit_order(1, seller, Side::SELL, 50000, "1.0"));
        let (outcome, step) = place(&mut engine, &ledger, limit_order(2, buyer, Side::BUY, 50000, "1.0"));

        match outcome {
            CommandOutcome::Placed(order) => {
                assert_eq!(order.status, OrderStatus::Filled);
                assert_eq!(order.avg_fill_price, Some(Price::from_u64(50000)));
            }
            other => panic!("expected Placed, got {:?}", other),
        }
        assert_eq!(step.trades().count(), 1);
        assert!(engine.best_bid().is_none());
        assert!(engine.best_ask().is_none());

        assert_eq!(
            ledger.balance(buyer, &Asset::new("BTC")).available,
            Decimal::from(1)
        );
        assert_eq!(
            ledger.balance(seller, &Asset::new("USDT")).available,
            Decimal::from(50000)
        );
        ledger.audit().unwrap();
    }

    #[test]
    fn test_no_cross_rests_both() {
        let (mut engine, ledger) = engine();
        let seller = AccountId::new();
        let buyer = AccountId::new();
        fund(&ledger, seller, "BTC", 1);
        fund(&ledger, buyer, "USDT", 100_000);

        place(&mut engine, &ledger, limit_order(1, seller, Side::SELL, 51000, "1.0"));
        let (_, step) = place(&mut engine, &ledger, limit_order(2, buyer, Side::BUY, 50000, "1.0"));

        assert_eq!(step.trades().count(), 0);
        assert_eq!(engine.best_bid().unwrap().0, Price::from_u64(50000));
        assert_eq!(engine.best_ask().unwrap().0, Price::from_u64(51000));
    }

    #[test]
    fn test_partial_fill_rests_remainder() {
        let (mut engine, ledger) = engine();
        let seller = AccountId::new();
        let buyer = AccountId::new();
        fund(&ledger, seller, "BTC", 1);
        fund(&ledger, buyer, "USDT", 100_000);

        place(&mut engine, &ledger, limit_order(1, seller, Side::SELL, 50000, "0.5"));
        let (outcome, _) = place(&mut engine, &ledger, limit_order(2, buyer, Side::BUY, 50000, "1.0"));

        match outcome {
            CommandOutcome::Placed(order) => {
                assert_eq!(order.status, OrderStatus::PartiallyFilled);
                assert_eq!(
                    order.remaining_quantity,
                    Quantity::from_str("0.5").unwrap()
                );
            }
            other => panic!("expected Placed, got {:?}", other),
        }
        assert_eq!(engine.best_bid().unwrap().0, Price::from_u64(50000));
    }

    #[test]
    fn test_cancel_releases_reservation_once() {
        let (mut engine, ledger) = engine();
        let buyer = AccountId::new();
        fund(&ledger, buyer, "USDT", 100_000);

        place(&mut engine, &ledger, limit_order(1, buyer, Side::BUY, 50000, "1.0"));
        assert_eq!(
            ledger.balance(buyer, &Asset::new("USDT")).reserved,
            Decimal::from(50000)
        );

        let (outcome, _) = engine.apply(
            EngineCommand::Cancel {
                order_id: OrderId::new(1),
            },
            TS + 1,
        );
        assert!(matches!(outcome, CommandOutcome::Cancelled(_)));
        assert_eq!(
            ledger.balance(buyer, &Asset::new("USDT")).reserved,
            Decimal::ZERO
        );

        // Second cancel: idempotent, no double release
        let (outcome, step) = engine.apply(
            EngineCommand::Cancel {
                order_id: OrderId::new(1),
            },
            TS + 2,
        );
        match outcome {
            CommandOutcome::Cancelled(order) => {
                assert_eq!(
                    order.status,
                    OrderStatus::Cancelled(CancelReason::UserRequested)
                );
            }
            other => panic!("expected Cancelled, got {:?}", other),
        }
        assert!(step.is_empty());
        ledger.audit().unwrap();
    }

    #[test]
    fn test_cancel_unknown_order() {
        let (mut engine, _) = engine();
        let (outcome, _) = engine.apply(
            EngineCommand::Cancel {
                order_id: OrderId::new(99),
            },
            TS,
        );
        assert!(matches!(outcome, CommandOutcome::NotFound));
    }

    #[test]
    fn test_self_trade_cancels_resting_maker() {
        let (mut engine, ledger) = engine();
        let user = AccountId::new();
        let other = AccountId::new();
        fund(&ledger, user, "BTC", 2);
        fund(&ledger, user, "USDT", 200_000);
        fund(&ledger, other, "BTC", 1);

        // User's own ask at 50000, another seller behind it at 50010
        place(&mut engine, &ledger, limit_order(1, user, Side::SELL, 50000, "1.0"));
        place(&mut engine, &ledger, limit_order(2, other, Side::SELL, 50010, "1.0"));

        let (outcome, step) = place(&mut engine, &ledger, limit_order(3, user, Side::BUY, 50010, "1.0"));

        // No self-trade printed; the user's resting ask was cancelled and
        // the taker filled against the other seller.
        for trade in step.trades() {
            assert!(trade.validate_no_self_trade());
        }
        assert_eq!(step.trades().count(), 1);
        match outcome {
            CommandOutcome::Placed(order) => assert_eq!(order.status, OrderStatus::Filled),
            other => panic!("expected Placed, got {:?}", other),
        }

        let (outcome, _) = engine.apply(
            EngineCommand::Query {
                order_id: OrderId::new(1),
            },
            TS + 1,
        );
        match outcome {
            CommandOutcome::OrderSnapshot(order) => assert_eq!(
                order.status,
                OrderStatus::Cancelled(CancelReason::SelfTradePrevented)
            ),
            other => panic!("expected OrderSnapshot, got {:?}", other),
        }
        ledger.audit().unwrap();
    }

    #[test]
    fn test_gtd_expires_at_queue_head() {
        let (mut engine, ledger) = engine();
        let buyer = AccountId::new();
        fund(&ledger, buyer, "USDT", 100_000);

        let order = Order::new(
            OrderId::new(1),
            buyer,
            Symbol::new("BTC/USDT"),
            Side::BUY,
            OrderType::Limit,
            Quantity::from_str("1.0").unwrap(),
            TimeInForce::GTD(TS + 1000),
            TS,
        )
        .with_price(Price::from_u64(50000));
        place(&mut engine, &ledger, order);
        assert!(engine.best_bid().is_some());

        // Any later command first sweeps due expiries
        let (_, step) = engine.apply(
            EngineCommand::Query {
                order_id: OrderId::new(1),
            },
            TS + 2000,
        );
        assert!(engine.best_bid().is_none());
        assert!(step.events.iter().any(|e| matches!(
            e.event,
            EngineEvent::OrderUpdate {
                status: OrderStatus::Cancelled(CancelReason::Expired),
                ..
            }
        )));
        assert_eq!(
            ledger.balance(buyer, &Asset::new("USDT")).reserved,
            Decimal::ZERO
        );
    }

    #[test]
    fn test_halted_engine_refuses_commands() {
        let (mut engine, ledger) = engine();
        let buyer = AccountId::new();
        let seller = AccountId::new();
        fund(&ledger, buyer, "USDT", 100_000);
        fund(&ledger, seller, "BTC", 1);

        place(&mut engine, &ledger, limit_order(1, seller, Side::SELL, 50000, "1.0"));

        // Sabotage the seller's reservation behind the engine's back so
        // settlement hits a reserved underflow.
        ledger.restore(seller, Asset::new("BTC"), Decimal::ZERO, Decimal::ZERO);

        let (outcome, step) = place(&mut engine, &ledger, limit_order(2, buyer, Side::BUY, 50000, "1.0"));
        assert!(matches!(outcome, CommandOutcome::Halted));
        assert!(step
            .events
            .iter()
            .any(|e| matches!(e.event, EngineEvent::SymbolHalted { .. })));
        assert!(engine.is_halted());

        let (outcome, _) = engine.apply(
            EngineCommand::Query {
                order_id: OrderId::new(1),
            },
            TS + 1,
        );
        assert!(matches!(outcome, CommandOutcome::Halted));
    }
}
