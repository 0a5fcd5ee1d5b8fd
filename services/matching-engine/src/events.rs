//! Engine event structures
//!
//! Every state change a symbol engine makes is described by an
//! `EngineEvent`. Events produced while applying a single command form one
//! `MatchStep`: they carry consecutive per-symbol sequence numbers and are
//! committed (logged and published) as one unit, so no consumer can observe
//! a partial step.

use ledger::BalanceChange;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::ids::{AccountId, OrderId};
use types::market::Symbol;
use types::numeric::{Price, Quantity};
use types::order::{OrderStatus, OrderType, Side, TimeInForce, TriggerReference};
use types::trade::Trade;

/// A state change with its per-symbol sequence number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeqEvent {
    pub seq: u64,
    pub ts_ns: i64,
    pub event: EngineEvent,
}

/// All events a symbol engine can emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum EngineEvent {
    /// An order came to rest on the book.
    ///
    /// Carries everything replay needs to rebuild the resting entry,
    /// including the reservation still backing the order at rest time.
    OrderAccepted {
        order_id: OrderId,
        account_id: AccountId,
        side: Side,
        price: Price,
        quantity: Quantity,
        time_in_force: TimeInForce,
        reserved_remaining: Decimal,
    },

    /// A stop order entered the shelf.
    StopShelved {
        order_id: OrderId,
        account_id: AccountId,
        side: Side,
        order_type: OrderType,
        stop_price: Price,
        trigger: TriggerReference,
        price: Option<Price>,
        quantity: Quantity,
        time_in_force: TimeInForce,
        reserved_remaining: Decimal,
    },

    /// A fill between a resting maker and an incoming taker.
    Trade(Trade),

    /// An order's status, fill total, or average price changed.
    ///
    /// Delivered on the owner's private channel, never the public one.
    OrderUpdate {
        order_id: OrderId,
        account_id: AccountId,
        status: OrderStatus,
        filled_quantity: Quantity,
        avg_fill_price: Option<Price>,
    },

    /// A price level's advertised size changed. `size` is absolute;
    /// zero means the level was removed.
    BookDelta {
        side: Side,
        price: Price,
        size: Decimal,
    },

    /// A balance reached a new absolute state.
    BalanceUpdate(BalanceChange),

    /// The engine hit an internal inconsistency and stopped.
    SymbolHalted { detail: String },
}

impl EngineEvent {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            EngineEvent::OrderAccepted { .. } => "OrderAccepted",
            EngineEvent::StopShelved { .. } => "StopShelved",
            EngineEvent::Trade(_) => "Trade",
            EngineEvent::OrderUpdate { .. } => "OrderUpdate",
            EngineEvent::BookDelta { .. } => "BookDelta",
            EngineEvent::BalanceUpdate(_) => "BalanceUpdate",
            EngineEvent::SymbolHalted { .. } => "SymbolHalted",
        }
    }
}

/// The events produced by applying one command to a symbol engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchStep {
    pub symbol: Symbol,
    pub events: Vec<SeqEvent>,
}

impl MatchStep {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            events: Vec::new(),
        }
    }

    /// Append an event, assigning it the next sequence number.
    pub fn push(&mut self, seq: &mut u64, ts_ns: i64, event: EngineEvent) -> u64 {
        *seq += 1;
        self.events.push(SeqEvent {
            seq: *seq,
            ts_ns,
            event,
        });
        *seq
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn first_seq(&self) -> Option<u64> {
        self.events.first().map(|e| e.seq)
    }

    pub fn last_seq(&self) -> Option<u64> {
        self.events.last().map(|e| e.seq)
    }

    /// The trades printed in this step.
    pub fn trades(&self) -> impl Iterator<Item = &Trade> {
        self.events.iter().filter_map(|e| match &e.event {
            EngineEvent::Trade(trade) => Some(trade),
            _ => None,
        })
    }
}
