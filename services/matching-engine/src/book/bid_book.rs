//! Bid (buy-side) order book
//!
//! Maintains buy orders sorted by price descending (best bid first).
//! Uses BTreeMap for O(log n) insert/remove, O(1) best access, and
//! deterministic iteration order.

use std::collections::BTreeMap;
use rust_decimal::Decimal;
use types::ids::OrderId;
use types::numeric::{Price, Quantity};

use super::price_level::{PriceLevel, RestingEntry};

/// Bid (buy) side order book
///
/// The highest price is the best bid. At each price level, orders are
/// maintained in FIFO order.
#[derive(Debug, Clone, Default)]
pub struct BidBook {
    levels: BTreeMap<Price, PriceLevel>,
}

impl BidBook {
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

    /// Best bid price and total quantity at that level.
    pub fn best_bid(&self) -> Option<(Price, Decimal)> {
        // BTreeMap iterates ascending, so the best bid is last
        self.levels
            .iter()
            .next_back()
            .map(|(price, level)| (*price, level.total_quantity()))
    }

    /// Best bid price.
    pub fn best_bid_price(&self) -> Option<Price> {
        self.levels.keys().next_back().copied()
    }

    /// Front (oldest) resting order at the best level, cloned out.
    pub fn best_front(&self) -> Option<(Price, RestingEntry)> {
        self.levels
            .iter()
            .next_back()
            .and_then(|(price, level)| level.front().map(|entry| (*price, entry.clone())))
    }

    /// Reduce the front order at `price` by `quantity`.
    ///
    /// Returns the level's total after the fill (0 = level removed).
    pub fn reduce_front(&mut self, price: Price, quantity: Quantity) -> Decimal {
        let level = self
            .levels
            .get_mut(&price)
            .expect("fill against a missing bid level");
        level.reduce_front(quantity);
        let total = level.total_quantity();
        if level.is_empty() {
            self.levels.remove(&price);
        }
        total
    }

    /// Iterate levels from best (highest) to worst.
    pub fn levels_from_best(&self) -> impl Iterator<Item = (&Price, &PriceLevel)> {
        self.levels.iter().rev()
    }

    /// Depth snapshot: top N levels, best first.
    pub fn depth_snapshot(&self, depth: usize) -> Vec<(Price, Decimal)> {
        self.levels
            .iter()
            .rev()
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

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::AccountId;

    fn entry(order_id: u64, qty: &str) -> RestingEntry {
        RestingEntry {
            order_id: OrderId::new(order_id),
            account_id: AccountId::new(),
            remaining_quantity: Quantity::from_str(qty).unwrap(),
            arrival_seq: order_id,
        }
    }

    #[test]
    fn test_best_bid_is_highest_price() {
        let mut book = BidBook::new();
        book.insert(Price::from_u64(50000), entry(1, "1.0"));
        book.insert(Price::from_u64(51000), entry(2, "2.0"));
        book.insert(Price::from_u64(49000), entry(3, "1.5"));

        let (best_price, best_qty) = book.best_bid().unwrap();
        assert_eq!(best_price, Price::from_u64(51000));
        assert_eq!(best_qty, Decimal::from(2));
    }

    #[test]
    fn test_remove_clears_empty_level() {
        let mut book = BidBook::new();
        book.insert(Price::from_u64(50000), entry(1, "1.0"));

        let (removed, total) = book.remove(&OrderId::new(1), Price::from_u64(50000)).unwrap();
        assert_eq!(removed.order_id, OrderId::new(1));
        assert_eq!(total, Decimal::ZERO);
        assert!(book.is_empty());
    }

    #[test]
    fn test_reduce_front_keeps_time_priority() {
        let mut book = BidBook::new();
        book.insert(Price::from_u64(50000), entry(1, "1.0"));
        book.insert(Price::from_u64(50000), entry(2, "2.0"));

        let total = book.reduce_front(Price::from_u64(50000), Quantity::from_str("1.0").unwrap());
        assert_eq!(total, Decimal::from(2));

        let (_, front) = book.best_front().unwrap();
        assert_eq!(front.order_id, OrderId::new(2));
    }

    #[test]
    fn test_depth_snapshot_best_first() {
        let mut book = BidBook::new();
        book.insert(Price::from_u64(50000), entry(1, "1.0"));
        book.insert(Price::from_u64(51000), entry(2, "2.0"));
        book.insert(Price::from_u64(49000), entry(3, "1.5"));
        book.insert(Price::from_u64(52000), entry(4, "0.5"));

        let depth = book.depth_snapshot(2);
        assert_eq!(depth.len(), 2);
        assert_eq!(depth[0].0, Price::from_u64(52000));
        assert_eq!(depth[1].0, Price::from_u64(51000));
    }
}
