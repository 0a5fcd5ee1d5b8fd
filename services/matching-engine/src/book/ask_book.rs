//! Ask (sell-side) order book
//!
//! Maintains sell orders sorted by price ascending (best ask first).
//! Mirror image of the bid book.

use std::collections::BTreeMap;
use rust_decimal::Decimal;
use types::ids::OrderId;
use types::numeric::{Price, Quantity};

use super::price_level::{PriceLevel, RestingEntry};

/// Ask (sell) side order book
///
/// The lowest price is the best ask. At each price level, orders are
/// maintained in FIFO order.
#[derive(Debug, Clone, Default)]
pub struct AskBook {
    levels: BTreeMap<Price, PriceLevel>,
}

impl AskBook {
    pub fn new() -> Self {
        Self {
            levels: BTreeMap::new(),
        }
    }

    /// Insert a resting order at the tail of its price level.
    ///
    /// Returns the level's total quantity after the insert.
    pub fn insert(&mut self, price: Price, entry: RestingEntry) -> Decimal {
        let level = self.levels.entry(price).or_default();
        level.insert(entry);
        level.total_quantity()
    }

    /// Remove an order from the book.
    ///
    /// Returns the removed entry and the level's total quantity after the
    /// removal (0 = level removed).
    pub fn remove(&mut self, order_id: &OrderId, price: Price) -> Option<(RestingEntry, Decimal)> {
        let level = self.levels.get_mut(&price)?;
        let entry = level.remove(order_id)?;
        let total = level.total_quantity();
        if level.is_empty() {
            self.levels.remove(&price);
        }
        Some((entry, total))
    }

    /// Best ask price and total quantity at that level.
    pub fn best_ask(&self) -> Option<(Price, Decimal)> {
        self.levels
            .iter()
            .next()
            .map(|(price, level)| (*price, level.total_quantity()))
    }

    /// Best ask price.
    pub fn best_ask_price(&self) -> Option<Price> {
        self.levels.keys().next().copied()
    }

    /// Front (oldest) resting order at the best level, cloned out.
    pub fn best_front(&self) -> Option<(Price, RestingEntry)> {
        self.levels
            .iter()
            .next()
            .and_then(|(price, level)| level.front().map(|entry| (*price, entry.clone())))
    }

    /// Reduce the front order at `price` by `quantity`.
    ///
    /// Returns the level's total after the fill (0 = level removed).
    pub fn reduce_front(&mut self, price: Price, quantity: Quantity) -> Decimal {
        let level = self
            .levels
            .get_mut(&price)
            .expect("fill against a missing ask level");
        level.reduce_front(quantity);
        let total = level.total_quantity();
        if level.is_empty() {
            self.levels.remove(&price);
        }
        total
    }

    /// Iterate levels from best (lowest) to worst.
    pub fn levels_from_best(&self) -> impl Iterator<Item = (&Price, &PriceLevel)> {
        self.levels.iter()
    }

    /// Depth snapshot: top N levels, best first.
    pub fn depth_snapshot(&self, depth: usize) -> Vec<(Price, Decimal)> {
        self.levels
            .iter()
            .take(depth)
            .map(|(price, level)| (*price, level.total_quantity()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }
}
