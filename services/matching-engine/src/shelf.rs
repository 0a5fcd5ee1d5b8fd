//! Stop shelf
//!
//! Dormant stop orders indexed by trigger price. Buy stops fire when the
//! reference price rises to or above their stop price; sell stops fire when
//! it falls to or below. Triggered orders are returned in shelf-arrival
//! order regardless of which side they sat on.

use std::collections::BTreeMap;
use std::collections::VecDeque;
use serde::{Deserialize, Serialize};
use types::ids::OrderId;
use types::numeric::Price;
use types::order::Side;

/// One dormant stop order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShelvedStop {
    pub order_id: OrderId,
    pub arrival: u64,
}

/// Stop orders for a single trigger reference (last price or mark price).
#[derive(Debug, Clone, Default)]
pub struct StopShelf {
    /// Buy stops, keyed by stop price; trigger when reference >= key
    buy_stops: BTreeMap<Price, VecDeque<ShelvedStop>>,
    /// Sell stops, keyed by stop price; trigger when reference <= key
    sell_stops: BTreeMap<Price, VecDeque<ShelvedStop>>,
    arrival_counter: u64,
}

impl StopShelf {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shelve a stop order. Returns its arrival number.
    pub fn shelve(&mut self, side: Side, stop_price: Price, order_id: OrderId) -> u64 {
        self.arrival_counter += 1;
        let record = ShelvedStop {
            order_id,
            arrival: self.arrival_counter,
        };
        let shelf = match side {
            Side::BUY => &mut self.buy_stops,
            Side::SELL => &mut self.sell_stops,
        };
        shelf.entry(stop_price).or_default().push_back(record);
        self.arrival_counter
    }

    /// Remove a shelved stop (cancellation). Returns true if it was found.
    pub fn remove(&mut self, side: Side, stop_price: Price, order_id: &OrderId) -> bool {
        let shelf = match side {
            Side::BUY => &mut self.buy_stops,
            Side::SELL => &mut self.sell_stops,
        };
        if let Some(queue) = shelf.get_mut(&stop_price) {
            if let Some(position) = queue.iter().position(|s| &s.order_id == order_id) {
                queue.remove(position);
                if queue.is_empty() {
                    shelf.remove(&stop_price);
                }
                return true;
            }
        }
        false
    }

    /// Pull every stop triggered by `reference`, in shelf-arrival order.
    pub fn take_triggered(&mut self, reference: Price) -> Vec<OrderId> {
        let mut fired: Vec<ShelvedStop> = Vec::new();

        let buy_keys: Vec<Price> = self
            .buy_stops
            .range(..=reference)
            .map(|(price, _)| *price)
            .collect();
        for key in buy_keys {
            if let Some(queue) = self.buy_stops.remove(&key) {
                fired.extend(queue);
            }
        }

        let sell_keys: Vec<Price> = self
            .sell_stops
            .range(reference..)
            .map(|(price, _)| *price)
            .collect();
        for key in sell_keys {
            if let Some(queue) = self.sell_stops.remove(&key) {
                fired.extend(queue);
            }
        }

        fired.sort_by_key(|s| s.arrival);
        fired.into_iter().map(|s| s.order_id).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.buy_stops.is_empty() && self.sell_stops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buy_stops.values().map(|q| q.len()).sum::<usize>()
            + self.sell_stops.values().map(|q| q.len()).sum::<usize>()
    }

    /// Sorted view of every shelved stop (for state digests).
    pub fn snapshot(&self) -> Vec<(Side, Price, ShelvedStop)> {
        let mut out: Vec<(Side, Price, ShelvedStop)> = Vec::new();
        for (price, queue) in &self.buy_stops {
            out.extend(queue.iter().map(|s| (Side::BUY, *price, *s)));
        }
        for (price, queue) in &self.sell_stops {
            out.extend(queue.iter().map(|s| (Side::SELL, *price, *s)));
        }
        out.sort_by_key(|(_, _, s)| s.arrival);
        out
    }

    /// Restore the arrival counter after replay.
    pub fn set_arrival_counter(&mut self, counter: u64) {
        self.arrival_counter = self.arrival_counter.max(counter);
    }
}
