//! Matching Engine
//!
//! Per-symbol price-time-priority matching. One `SymbolEngine` owns one
//! symbol's book exclusively; the hosting task feeds it commands from a
//! single-consumer queue and commits the resulting event step before the
//! next command.
//!
//! The library is fully synchronous: all I/O, queuing, and fan-out live in
//! the hosting process.

pub mod book;
pub mod matching;
pub mod events;
pub mod shelf;
pub mod expiry;
pub mod engine;

pub use engine::{CommandOutcome, EngineCommand, SymbolEngine};
pub use events::{EngineEvent, MatchStep, SeqEvent};
