//! Market Data Service
//!
//! Turns committed match steps into the public and private event streams:
//!
//! - `events`: channel names and wire frames
//! - `book_mirror`: per-symbol book state rebuilt purely from deltas
//! - `snapshot`: checksummed full-depth snapshots for subscribe/reconnect
//! - `bus`: broadcast fan-out with lag-based disconnect
//! - `publisher`: the step commit pipeline (mirror → fan-out → WAL)
//!
//! Publishing never blocks on subscribers: a consumer that falls behind the
//! channel's high-water mark is dropped with a `Lagged` close, and matching
//! proceeds regardless.

pub mod events;
pub mod book_mirror;
pub mod snapshot;
pub mod bus;
pub mod publisher;

pub use bus::{BusConfig, SubscriptionBus};
pub use events::{Channel, EventFrame};
pub use publisher::StepPublisher;
