//! Gateway — the single server process for the matching core
//!
//! Boot sequence: load configuration → rebuild every symbol's book and the
//! ledger from the write-ahead logs → spawn one matching task per symbol →
//! serve the order RPC and the subscription websocket on one socket.
//!
//! Exit codes: 0 normal, 1 configuration error, 2 replay failure.

mod auth;
mod config;
mod error;
mod handlers;
mod kyc;
mod models;
mod rate_limit;
mod router;
mod runtime;
mod state;
mod validate;

use crate::auth::JwtAuthResolver;
use crate::config::Settings;
use crate::kyc::StaticKycPolicy;
use crate::rate_limit::RateLimiter;
use crate::runtime::spawn_symbol_task;
use crate::state::{AppState, OrderRoute};
use ledger::Ledger;
use market_data::{BusConfig, StepPublisher, SubscriptionBus};
use matching_engine::SymbolEngine;
use persistence::{recover_symbol, WalConfig, WalWriter};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("starting matching core gateway");

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(err) => {
            tracing::error!(error = %err, "configuration error");
            std::process::exit(1);
        }
    };

    let state = match boot(&settings).await {
        Ok(state) => state,
        Err(BootError::Config(err)) => {
            tracing::error!(error = %err, "configuration error");
            std::process::exit(1);
        }
        Err(BootError::Recovery(err)) => {
            tracing::error!(error = %err, "replay failure");
            std::process::exit(2);
        }
    };

    if let Err(err) = serve(&settings, state).await {
        tracing::error!(error = %err, "server error");
        std::process::exit(1);
    }
}

async fn serve(settings: &Settings, state: AppState) -> Result<(), anyhow::Error> {
    let app = router::create_router(state);
    let listener = TcpListener::bind(&settings.listen_addr).await?;
    tracing::info!(addr = %settings.listen_addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

enum BootError {
    Config(config::ConfigError),
    Recovery(persistence::RecoveryError),
}

async fn boot(settings: &Settings) -> Result<AppState, BootError> {
    let fee_account = settings.fee_account_id().map_err(BootError::Config)?;
    let symbols = settings.symbol_configs().map_err(BootError::Config)?;

    let ledger = Arc::new(Ledger::new(fee_account));
    let bus = Arc::new(SubscriptionBus::new(BusConfig {
        channel_capacity: settings.bus.channel_capacity,
    }));
    let wal_dir = Path::new(&settings.wal_dir);

    let mut engines = HashMap::new();
    let mut max_order_id = 0u64;
    let mut open_orders = Vec::new();

    for (symbol, symbol_config) in &symbols {
        let mut engine = SymbolEngine::new(symbol_config.clone(), ledger.clone());
        recover_symbol(&mut engine, wal_dir).map_err(BootError::Recovery)?;

        max_order_id = max_order_id.max(engine.max_order_id());
        for (order_id, account_id) in engine.open_orders() {
            open_orders.push((
                order_id,
                OrderRoute {
                    symbol: symbol.clone(),
                    account_id,
                },
            ));
        }

        bus.register_symbol(symbol.clone());
        let mut wal = WalWriter::open(WalConfig::for_symbol(wal_dir, symbol))
            .map_err(|err| BootError::Recovery(err.into()))?;
        wal.set_next_seq(engine.seq() + 1);
        let publisher = StepPublisher::new(wal, bus.clone());

        engines.insert(symbol.clone(), spawn_symbol_task(engine, publisher));
    }

    let state = AppState::new(
        ledger,
        bus,
        engines,
        symbols,
        JwtAuthResolver::new(&settings.auth.jwt_secret),
        Arc::new(StaticKycPolicy::new(
            settings.kyc.max_order_notional,
            settings.kyc.max_leverage,
        )),
        RateLimiter::new(settings.rate_limits.clone()),
        max_order_id + 1,
    );

    for (order_id, route) in open_orders {
        state.order_router.insert(order_id, route);
    }

    Ok(state)
}
