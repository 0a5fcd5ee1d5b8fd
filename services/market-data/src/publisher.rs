//! Step publisher
//!
//! Commits one match step at a time: hand the step to the bus (mirror
//! update + fan-out) as soon as the in-memory state is final, then append
//! every event to the symbol's WAL. Persistence trails the bus; nothing
//! blocks on disk before subscribers can observe the step. The owning
//! symbol task calls `commit` before applying the next command, so no
//! consumer can observe a partial step.

use crate::bus::SubscriptionBus;
use matching_engine::MatchStep;
use persistence::{WalError, WalRecord, WalWriter};
use std::sync::Arc;

/// Per-symbol commit pipeline.
pub struct StepPublisher {
    wal: WalWriter,
    bus: Arc<SubscriptionBus>,
}

impl StepPublisher {
    pub fn new(wal: WalWriter, bus: Arc<SubscriptionBus>) -> Self {
        Self { wal, bus }
    }

    /// Publish the step, then log it.
    ///
    /// A WAL failure after fan-out stops the symbol (the caller halts the
    /// task), so the log can trail the bus by at most the in-flight step.
    pub fn commit(&mut self, step: &MatchStep) -> Result<(), WalError> {
        if step.events.is_empty() {
            return Ok(());
        }

        self.bus.publish_step(step);

        for event in &step.events {
            let payload = serde_json::to_vec(event)
                .map_err(|e| WalError::Serialization(e.to_string()))?;
            self.wal
                .append(&WalRecord::new(event.seq, event.ts_ns as u64, payload))?;
        }

        tracing::trace!(
            symbol = %step.symbol,
            first_seq = step.first_seq(),
            last_seq = step.last_seq(),
            events = step.events.len(),
            "step committed"
        );
        Ok(())
    }

    /// Flush and fsync the WAL (shutdown path).
    pub fn sync(&mut self) -> Result<(), WalError> {
        self.wal.sync()
    }

    /// Next sequence the WAL expects (set from the engine after recovery).
    pub fn set_next_seq(&mut self, seq: u64) {
        self.wal.set_next_seq(seq);
    }
}
