//! Determinism — state digests and replay-equivalence checks
//!
//! A digest is a SHA-256 over the canonical (sorted) serialization of the
//! engine's book state plus the ledger's balance table. Live state at seq S
//! and a replay of the WAL up to seq S must digest identically.

use ledger::Ledger;
use matching_engine::SymbolEngine;
use sha2::{Digest, Sha256};

/// Digest of one engine's authoritative state.
pub fn engine_digest(engine: &SymbolEngine) -> String {
    let snapshot = engine.snapshot();
    let bytes = serde_json::to_vec(&snapshot).expect("engine snapshot serializes");
    hex_digest(&bytes)
}

/// Digest of the full balance table, in sorted order.
pub fn ledger_digest(ledger: &Ledger) -> String {
    let snapshot = ledger.snapshot();
    let bytes = serde_json::to_vec(&snapshot).expect("ledger snapshot serializes");
    hex_digest(&bytes)
}

/// Combined digest used by the replay-equivalence check.
pub fn state_digest(engine: &SymbolEngine, ledger: &Ledger) -> String {
    let mut hasher = Sha256::new();
    hasher.update(engine_digest(engine).as_bytes());
    hasher.update(b"|");
    hasher.update(ledger_digest(ledger).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Whether a replayed (engine, ledger) pair matches the live pair.
pub fn verify_replay_equivalence(
    live: (&SymbolEngine, &Ledger),
    replayed: (&SymbolEngine, &Ledger),
) -> bool {
    state_digest(live.0, live.1) == state_digest(replayed.0, replayed.1)
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
