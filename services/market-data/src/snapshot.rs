//! Checksummed book snapshots
//!
//! A snapshot taken at `seq = S` lets a subscriber reconstruct the book by
//! applying only deltas with `seq > S`. The SHA-256 checksum covers the
//! sorted levels plus the sequence, so divergence is detectable.

use rust_decimal::Decimal;
use serde_json::json;
use sha2::{Digest, Sha256};
use types::market::Symbol;
use types::numeric::Price;

/// Full-depth book snapshot, best-first on both sides.
#[derive(Debug, Clone, PartialEq)]
pub struct BookSnapshot {
    pub symbol: Symbol,
    /// Bid levels in descending price order (best first).
    pub bids: Vec<(Price, Decimal)>,
    /// Ask levels in ascending price order (best first).
    pub asks: Vec<(Price, Decimal)>,
    /// Last event sequence included in this snapshot.
    pub seq: u64,
    pub checksum: String,
}

impl BookSnapshot {
    pub fn new(symbol: Symbol, bids: Vec<(Price, Decimal)>, asks: Vec<(Price, Decimal)>, seq: u64) -> Self {
        let checksum = compute_checksum(&bids, &asks, seq);
        Self {
            symbol,
            bids,
            asks,
            seq,
            checksum,
        }
    }

    /// Wire payload: `{bids: [[price, size]…], asks: […], checksum}`.
    pub fn payload(&self) -> serde_json::Value {
        let encode = |levels: &[(Price, Decimal)]| -> Vec<[String; 2]> {
            levels
                .iter()
                .map(|(price, size)| [price.to_string(), size.to_string()])
                .collect()
        };
        json!({
            "bids": encode(&self.bids),
            "asks": encode(&self.asks),
            "checksum": self.checksum,
        })
    }
}

/// Compute a SHA-256 checksum over the book levels and sequence.
pub fn compute_checksum(bids: &[(Price, Decimal)], asks: &[(Price, Decimal)], seq: u64) -> String {
    let mut hasher = Sha256::new();

    for (price, size) in bids {
        hasher.update(price.to_string().as_bytes());
        hasher.update(b":");
        hasher.update(size.to_string().as_bytes());
        hasher.update(b"|");
    }
    hasher.update(b"---");

    for (price, size) in asks {
        hasher.update(price.to_string().as_bytes());
        hasher.update(b":");
        hasher.update(size.to_string().as_bytes());
        hasher.update(b"|");
    }
    hasher.update(b"---");

    hasher.update(seq.to_le_bytes());
    format!("{:x}", hasher.finalize())
}

/// Verify that a snapshot's checksum matches its content.
pub fn verify_snapshot_integrity(snapshot: &BookSnapshot) -> bool {
    snapshot.checksum == compute_checksum(&snapshot.bids, &snapshot.asks, snapshot.seq)
}

/// A delta stream continues a snapshot iff it starts after the snapshot's
/// sequence.
pub fn continues_snapshot(snapshot: &BookSnapshot, first_delta_seq: u64) -> bool {
    first_delta_seq > snapshot.seq
}
