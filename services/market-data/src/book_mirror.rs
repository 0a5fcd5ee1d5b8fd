//! Book mirror — per-symbol depth state rebuilt from deltas
//!
//! The bus cannot read the engine's book (single owner), so it maintains a
//! mirror from the absolute-size deltas the engine emits. The mirror serves
//! subscription snapshots and tags them with the last applied sequence.

use crate::snapshot::BookSnapshot;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use types::market::Symbol;
use types::numeric::Price;
use types::order::Side;

/// Depth mirror for one symbol.
#[derive(Debug, Clone)]
pub struct BookMirror {
    pub symbol: Symbol,
    bids: BTreeMap<Price, Decimal>,
    asks: BTreeMap<Price, Decimal>,
    last_seq: u64,
}

impl BookMirror {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            last_seq: 0,
        }
    }

    /// Apply one delta. `size` is the level's new absolute quantity;
    /// zero removes the level.
    pub fn apply(&mut self, side: Side, price: Price, size: Decimal, seq: u64) {
        let levels = match side {
            Side::BUY => &mut self.bids,
            Side::SELL => &mut self.asks,
        };
        if size.is_zero() {
            levels.remove(&price);
        } else {
            levels.insert(price, size);
        }
        self.last_seq = seq;
    }

    /// Record that a sequence was observed without changing depth (trades,
    /// order updates). Keeps snapshot tags current.
    pub fn observe_seq(&mut self, seq: u64) {
        self.last_seq = self.last_seq.max(seq);
    }

    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    pub fn best_bid(&self) -> Option<(Price, Decimal)> {
        self.bids.iter().next_back().map(|(p, s)| (*p, *s))
    }

    pub fn best_ask(&self) -> Option<(Price, Decimal)> {
        self.asks.iter().next().map(|(p, s)| (*p, *s))
    }

    pub fn bid_depth(&self) -> usize {
        self.bids.len()
    }

    pub fn ask_depth(&self) -> usize {
        self.asks.len()
    }

    /// Full-depth snapshot, best-first on both sides.
    pub fn snapshot(&self) -> BookSnapshot {
        let bids: Vec<(Price, Decimal)> = self.bids.iter().rev().map(|(p, s)| (*p, *s)).collect();
        let asks: Vec<(Price, Decimal)> = self.asks.iter().map(|(p, s)| (*p, *s)).collect();
        BookSnapshot::new(self.symbol.clone(), bids, asks, self.last_seq)
    }
}
