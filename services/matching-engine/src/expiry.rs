//! GTD expiry queue
//!
//! Resting GTD orders are indexed by deadline. The engine drains due
//! entries at the head of its command queue, before applying each step.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use types::ids::OrderId;

/// Min-heap of (expiry timestamp, order id).
#[derive(Debug, Default)]
pub struct ExpiryQueue {
    heap: BinaryHeap<Reverse<(i64, OrderId)>>,
}

impl ExpiryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, expires_at_ns: i64, order_id: OrderId) {
        self.heap.push(Reverse((expires_at_ns, order_id)));
    }

    /// Pop every order whose deadline is at or before `now_ns`.
    ///
    /// Entries for orders that already left the book are filtered by the
    /// caller; the queue itself never rejects an id.
    pub fn pop_due(&mut self, now_ns: i64) -> Vec<OrderId> {
        let mut due = Vec::new();
        while let Some(Reverse((deadline, _))) = self.heap.peek() {
            if *deadline > now_ns {
                break;
            }
            let Reverse((_, order_id)) = self.heap.pop().expect("peeked entry exists");
            due.push(order_id);
        }
        due
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pop_due_in_deadline_order() {
        let mut queue = ExpiryQueue::new();
        queue.push(300, OrderId::new(3));
        queue.push(100, OrderId::new(1));
        queue.push(200, OrderId::new(2));

        let due = queue.pop_due(250);
        assert_eq!(due, vec![OrderId::new(1), OrderId::new(2)]);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_deadline_is_inclusive() {
        let mut queue = ExpiryQueue::new();
        queue.push(100, OrderId::new(1));

        assert!(queue.pop_due(99).is_empty());
        assert_eq!(queue.pop_due(100), vec![OrderId::new(1)]);
    }
}
