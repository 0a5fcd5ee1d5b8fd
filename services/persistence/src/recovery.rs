//! Recovery — rebuild book and ledger state from the WAL
//!
//! Boot sequence per symbol:
//! 1. Open the symbol's WAL and read records in sequence order
//! 2. Decode each payload back into its engine event
//! 3. Re-apply the event to a fresh engine (which restores the shared
//!    ledger through `BalanceUpdate` events)
//!
//! Replay failure is fatal: the process must not serve from a state it
//! could not reconstruct.

use crate::wal::{WalError, WalReader};
use matching_engine::{SeqEvent, SymbolEngine};
use std::path::Path;
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("WAL error: {0}")]
    Wal(#[from] WalError),

    #[error("undecodable event at seq {seq}: {detail}")]
    BadEvent { seq: u64, detail: String },
}

/// Metrics collected while replaying one symbol.
#[derive(Debug, Clone)]
pub struct RecoveryReport {
    pub replayed: u64,
    pub final_seq: u64,
    pub elapsed_ms: u64,
}

/// Replay a symbol's WAL into a fresh engine.
///
/// The engine must be newly constructed; events are applied in log order
/// and the engine's sequence counter ends at the last logged seq.
pub fn recover_symbol(engine: &mut SymbolEngine, wal_dir: &Path) -> Result<RecoveryReport, RecoveryError> {
    let start = Instant::now();
    let symbol = engine.config().symbol.clone();
    let mut reader = WalReader::open_for_symbol(wal_dir, &symbol)?;

    let mut replayed = 0u64;
    while let Some(record) = reader.next_record()? {
        let event: SeqEvent =
            serde_json::from_slice(&record.payload).map_err(|e| RecoveryError::BadEvent {
                seq: record.seq,
                detail: e.to_string(),
            })?;
        engine.restore_event(&event);
        replayed += 1;
    }

    let report = RecoveryReport {
        replayed,
        final_seq: engine.seq(),
        elapsed_ms: start.elapsed().as_millis() as u64,
    };
    tracing::info!(
        symbol = %symbol,
        replayed = report.replayed,
        final_seq = report.final_seq,
        elapsed_ms = report.elapsed_ms,
        "recovery complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::{WalConfig, WalRecord, WalWriter};
    use ledger::{FundingReason, Ledger};
    use matching_engine::{CommandOutcome, EngineCommand, MatchStep};
    use rust_decimal::Decimal;
    use rust_decimal::prelude::FromStr;
    use std::sync::Arc;
    use tempfile::TempDir;
    use types::fee::FeeSchedule;
    use types::ids::{AccountId, OrderId};
    use types::market::{Asset, Symbol, SymbolConfig};
    use types::numeric::{Price, Quantity};
    use types::order::{Order, OrderType, Side, TimeInForce};

    const TS: i64 = 1708123456789000000;

    fn config() -> SymbolConfig {
        SymbolConfig::new(
            Symbol::new("BTC/USDT"),
            Decimal::from_str("0.01").unwrap(),
            Decimal::from_str("0.0001").unwrap(),
            FeeSchedule::zero(),
        )
    }

    fn write_step(writer: &mut WalWriter, step: &MatchStep) {
        for event in &step.events {
            let payload = serde_json::to_vec(event).unwrap();
            writer
                .append(&WalRecord::new(event.seq, event.ts_ns as u64, payload))
                .unwrap();
        }
    }

    fn place(
        engine: &mut SymbolEngine,
        ledger: &Ledger,
        writer: &mut WalWriter,
        order: Order,
    ) -> CommandOutcome {
        let (asset, reserved) =
            matching_engine::engine::reservation_for(engine.config(), &order).unwrap();
        ledger.reserve(order.account_id, asset, reserved).unwrap();
        let (outcome, step) = engine.apply(EngineCommand::Place { order, reserved }, TS);
        write_step(writer, &step);
        outcome
    }

    #[test]
    fn test_recovery_rebuilds_book_and_ledger() {
        let tmp = TempDir::new().unwrap();
        let ledger = Arc::new(Ledger::new(AccountId::new()));
        let mut engine = SymbolEngine::new(config(), ledger.clone());
        let mut writer =
            WalWriter::open(WalConfig::for_symbol(tmp.path(), &Symbol::new("BTC/USDT"))).unwrap();
        writer.set_next_seq(1);

        let seller = AccountId::new();
        let buyer = AccountId::new();
        ledger
            .credit(seller, Asset::new("BTC"), Decimal::from(2), FundingReason::Deposit)
            .unwrap();
        ledger
            .credit(buyer, Asset::new("USDT"), Decimal::from(100_000), FundingReason::Deposit)
            .unwrap();

        // A resting ask, a partial cross, and a surviving bid
        let ask = Order::new(
            OrderId::new(1),
            seller,
            Symbol::new("BTC/USDT"),
            Side::SELL,
            OrderType::Limit,
            Quantity::from_str("2").unwrap(),
            TimeInForce::GTC,
            TS,
        )
        .with_price(Price::from_u64(50000));
        place(&mut engine, &ledger, &mut writer, ask);

        let bid = Order::new(
            OrderId::new(2),
            buyer,
            Symbol::new("BTC/USDT"),
            Side::BUY,
            OrderType::Limit,
            Quantity::from_str("1").unwrap(),
            TimeInForce::GTC,
            TS + 1,
        )
        .with_price(Price::from_u64(50000));
        place(&mut engine, &ledger, &mut writer, bid);
        writer.sync().unwrap();

        // Rebuild from the log
        let replay_ledger = Arc::new(Ledger::new(AccountId::new()));
        let mut replayed = SymbolEngine::new(config(), replay_ledger.clone());
        let report = recover_symbol(&mut replayed, tmp.path()).unwrap();

        assert!(report.replayed > 0);
        assert_eq!(report.final_seq, engine.seq());
        assert_eq!(replayed.best_ask(), engine.best_ask());
        assert_eq!(replayed.last_price(), engine.last_price());
        assert_eq!(
            replay_ledger.balance(buyer, &Asset::new("BTC")),
            ledger.balance(buyer, &Asset::new("BTC"))
        );
        assert_eq!(
            replay_ledger.balance(seller, &Asset::new("USDT")),
            ledger.balance(seller, &Asset::new("USDT"))
        );
    }

    #[test]
    fn test_recovery_of_empty_log() {
        let tmp = TempDir::new().unwrap();
        let ledger = Arc::new(Ledger::new(AccountId::new()));
        let mut engine = SymbolEngine::new(config(), ledger);

        let report = recover_symbol(&mut engine, tmp.path()).unwrap();
        assert_eq!(report.replayed, 0);
        assert_eq!(report.final_seq, 0);
    }

    #[test]
    fn test_recovery_rejects_garbage_payload() {
        let tmp = TempDir::new().unwrap();
        let mut writer =
            WalWriter::open(WalConfig::for_symbol(tmp.path(), &Symbol::new("BTC/USDT"))).unwrap();
        writer.set_next_seq(1);
        writer
            .append(&WalRecord::new(1, TS as u64, b"not an event".to_vec()))
            .unwrap();
        writer.sync().unwrap();

        let ledger = Arc::new(Ledger::new(AccountId::new()));
        let mut engine = SymbolEngine::new(config(), ledger);
        let err = recover_symbol(&mut engine, tmp.path()).unwrap_err();
        assert!(matches!(err, RecoveryError::BadEvent { seq: 1, .. }));
    }
}
