//! Subscription bus
//!
//! One broadcast channel per subscription channel. Publishing is
//! fire-and-forget: a send never waits for subscribers, so the matching
//! path cannot be slowed by a slow consumer. A receiver that falls more
//! than the channel capacity behind observes `Lagged` on its next recv;
//! the connection layer then closes it with a `Lagged` reason instead of
//! buffering further.
//!
//! Book subscriptions get a snapshot first: the receiver is created before
//! the snapshot is read, so every delta with `seq > snapshot.seq` is
//! guaranteed to be in the receiver's queue.

use crate::book_mirror::BookMirror;
use crate::events::{frames_for_step, Channel, EventFrame};
use crate::snapshot::BookSnapshot;
use dashmap::DashMap;
use matching_engine::{EngineEvent, MatchStep};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use types::market::Symbol;

/// Bus tuning.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Per-channel buffered frame capacity; the lag high-water mark.
    pub channel_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

/// Fan-out hub for every subscription channel.
pub struct SubscriptionBus {
    config: BusConfig,
    senders: DashMap<Channel, broadcast::Sender<Arc<EventFrame>>>,
    mirrors: DashMap<Symbol, Arc<Mutex<BookMirror>>>,
}

impl SubscriptionBus {
    pub fn new(config: BusConfig) -> Self {
        Self {
            config,
            senders: DashMap::new(),
            mirrors: DashMap::new(),
        }
    }

    /// Register a symbol so its mirror exists before the first event.
    pub fn register_symbol(&self, symbol: Symbol) {
        self.mirrors
            .entry(symbol.clone())
            .or_insert_with(|| Arc::new(Mutex::new(BookMirror::new(symbol))));
    }

    fn sender(&self, channel: &Channel) -> broadcast::Sender<Arc<EventFrame>> {
        self.senders
            .entry(channel.clone())
            .or_insert_with(|| broadcast::channel(self.config.channel_capacity).0)
            .clone()
    }

    /// Subscribe to any channel.
    pub fn subscribe(&self, channel: &Channel) -> broadcast::Receiver<Arc<EventFrame>> {
        self.sender(channel).subscribe()
    }

    /// Subscribe to a book channel: snapshot first, then the delta stream.
    ///
    /// The returned snapshot carries `seq = S`; the receiver holds every
    /// frame with `seq > S` (the consumer drops frames at or below S).
    pub fn subscribe_book(
        &self,
        symbol: &Symbol,
    ) -> Option<(BookSnapshot, broadcast::Receiver<Arc<EventFrame>>)> {
        let mirror = self.mirrors.get(symbol)?.clone();
        let receiver = self.subscribe(&Channel::Book {
            symbol: symbol.clone(),
        });
        let snapshot = mirror.lock().ok()?.snapshot();
        Some((snapshot, receiver))
    }

    /// Current book snapshot without subscribing.
    pub fn snapshot(&self, symbol: &Symbol) -> Option<BookSnapshot> {
        let mirror = self.mirrors.get(symbol)?.clone();
        let snapshot = mirror.lock().ok()?.snapshot();
        Some(snapshot)
    }

    /// Publish one committed step: mirror update first, then fan-out in
    /// sequence order.
    pub fn publish_step(&self, step: &MatchStep) {
        if step.events.is_empty() {
            return;
        }

        if let Some(mirror) = self.mirrors.get(&step.symbol).map(|m| m.clone()) {
            if let Ok(mut mirror) = mirror.lock() {
                for event in &step.events {
                    match &event.event {
                        EngineEvent::BookDelta { side, price, size } => {
                            mirror.apply(*side, *price, *size, event.seq);
                        }
                        _ => mirror.observe_seq(event.seq),
                    }
                }
            }
        }

        for (channel, frame) in frames_for_step(step) {
            // A send error only means no subscriber is listening
            let _ = self.sender(&channel).send(Arc::new(frame));
        }
    }

    /// Number of live subscribers on a channel.
    pub fn subscriber_count(&self, channel: &Channel) -> usize {
        self.senders
            .get(channel)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }
}
