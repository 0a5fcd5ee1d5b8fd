//! Price level implementation with FIFO queue
//!
//! A price level contains all resting orders at a specific price point.
//! Orders are maintained in FIFO (First-In-First-Out) order to enforce
//! time priority. The advertised level depth always equals the sum of the
//! resting remainders.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use types::ids::{AccountId, OrderId};
use types::numeric::Quantity;

/// A resting order's footprint on the book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestingEntry {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub remaining_quantity: Quantity,
    /// Event sequence at which the order arrived at this level
    pub arrival_seq: u64,
}

/// A price level containing orders at a specific price
///
/// Maintains strict FIFO ordering for time-priority matching.
#[derive(Debug, Clone, Default)]
pub struct PriceLevel {
    orders: VecDeque<RestingEntry>,
    total_quantity: Decimal,
}

impl PriceLevel {
    pub fn new() -> Self {
        Self {
            orders: VecDeque::new(),
            total_quantity: Decimal::ZERO,
        }
    }

    /// Insert an order at the back of the queue (time priority)
    pub fn insert(&mut self, entry: RestingEntry) {
        self.total_quantity += entry.remaining_quantity.as_decimal();
        self.orders.push_back(entry);
    }

    /// Remove an order from the queue by OrderId
    ///
    /// Returns the removed entry, or None if not found
    pub fn remove(&mut self, order_id: &OrderId) -> Option<RestingEntry> {
        let position = self
            .orders
            .iter()
            .position(|entry| &entry.order_id == order_id)?;
        let entry = self.orders.remove(position)?;
        self.total_quantity -= entry.remaining_quantity.as_decimal();
        Some(entry)
    }

    /// Peek at the front order without removing it
    pub fn front(&self) -> Option<&RestingEntry> {
        self.orders.front()
    }

    /// Reduce the front order by `quantity`, removing it when drained.
    ///
    /// # Panics
    /// Panics if the level is empty or the front order holds less than
    /// `quantity`; both are matching-loop bugs.
    pub fn reduce_front(&mut self, quantity: Quantity) {
        let front = self.orders.front_mut().expect("reduce_front on empty level");
        assert!(
            quantity.as_decimal() <= front.remaining_quantity.as_decimal(),
            "front order holds less than the fill quantity"
        );

        self.total_quantity -= quantity.as_decimal();
        match Quantity::try_new(front.remaining_quantity.as_decimal() - quantity.as_decimal()) {
            Some(remaining) => front.remaining_quantity = remaining,
            None => {
                self.orders.pop_front();
            }
        }
    }

    /// Iterate resting entries in FIFO order.
    pub fn iter(&self) -> impl Iterator<Item = &RestingEntry> {
        self.orders.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Total quantity resting at this price level
    pub fn total_quantity(&self) -> Decimal {
        self.total_quantity
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }
}
