//! Per-symbol engine tasks
//!
//! Each symbol gets one tokio task that exclusively owns its engine and
//! publisher. Commands arrive through a bounded mpsc queue in submission
//! order; the task applies one command, commits the resulting step
//! (fan-out first, WAL append after), replies, and only then takes the
//! next command.

use crate::error::AppError;
use market_data::StepPublisher;
use matching_engine::{CommandOutcome, EngineCommand, SymbolEngine};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, oneshot};
use types::errors::OrderError;

/// One queued command with its reply slot.
pub struct EngineRequest {
    pub command: EngineCommand,
    pub reply: oneshot::Sender<CommandOutcome>,
}

/// Handle to a symbol task's command queue.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Submit a command and wait for the engine's reply.
    pub async fn call(&self, command: EngineCommand) -> Result<CommandOutcome, AppError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(EngineRequest { command, reply })
            .await
            .map_err(|_| AppError::Order(OrderError::SymbolHalted))?;
        response
            .await
            .map_err(|_| AppError::Order(OrderError::SymbolHalted))
    }
}

/// Current wall clock in Unix nanoseconds.
pub fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .as_nanos() as i64
}

/// Spawn the single-consumer task for one symbol.
///
/// If committing a step fails, the in-memory state can no longer be
/// reconstructed from the log, so the task stops serving the symbol;
/// callers see `SYMBOL_HALTED` while other symbols continue.
pub fn spawn_symbol_task(mut engine: SymbolEngine, mut publisher: StepPublisher) -> EngineHandle {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(1024);
    let symbol = engine.config().symbol.clone();

    tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            let (outcome, step) = engine.apply(request.command, now_ns());

            if let Err(err) = publisher.commit(&step) {
                tracing::error!(symbol = %symbol, error = %err, "step commit failed, stopping symbol task");
                break;
            }

            // A dropped receiver only means the caller went away
            let _ = request.reply.send(outcome);
        }
        tracing::info!(symbol = %symbol, "symbol task stopped");
    });

    EngineHandle { tx }
}
