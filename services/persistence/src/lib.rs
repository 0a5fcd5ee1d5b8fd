//! Persistence & Deterministic Replay
//!
//! The core's only persistence obligation: an append-only write-ahead log
//! of `(seq, event)` per symbol. On restart the book and ledger are rebuilt
//! by replaying each symbol's log in sequence order.
//!
//! - `wal`: fixed-header record format, size-rotated writer, corruption
//!   tolerant sequential reader
//! - `recovery`: boot-time replay into a symbol engine + shared ledger
//! - `determinism`: state digests and replay-equivalence checks

pub mod wal;
pub mod recovery;
pub mod determinism;

pub use recovery::{recover_symbol, RecoveryError, RecoveryReport};
pub use wal::{WalConfig, WalError, WalReader, WalRecord, WalWriter};
