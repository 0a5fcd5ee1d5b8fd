//! Configuration loader
//!
//! Settings come from defaults, an optional `config.toml`, and environment
//! variables prefixed with `MATCHCORE_` (nested fields separated with
//! `__`, e.g. `MATCHCORE_AUTH__JWT_SECRET=...`).

pub use config::ConfigError;
use crate::rate_limit::RateLimitSettings;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use types::fee::FeeSchedule;
use types::ids::AccountId;
use types::market::{Symbol, SymbolConfig};

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Listening address for the single server socket (REST + WS).
    pub listen_addr: String,
    /// Directory holding the per-symbol write-ahead logs.
    pub wal_dir: String,
    /// Account that accrues maker/taker fees (UUID).
    pub fee_account: String,
    pub auth: AuthSettings,
    pub bus: BusSettings,
    pub kyc: KycSettings,
    pub rate_limits: RateLimitSettings,
    /// Tradable symbols; empty means the built-in default set.
    #[serde(default)]
    pub symbols: Vec<SymbolSettings>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthSettings {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusSettings {
    /// Per-channel buffered frame capacity (the lag high-water mark).
    pub channel_capacity: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KycSettings {
    pub max_order_notional: Decimal,
    pub max_leverage: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SymbolSettings {
    pub symbol: String,
    pub price_tick: Decimal,
    pub qty_step: Decimal,
    pub maker_fee_rate: Decimal,
    pub taker_fee_rate: Decimal,
}

impl Settings {
    /// Load settings from defaults, `config.toml` (optional), and env.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .set_default("listen_addr", "0.0.0.0:8080")?
            .set_default("wal_dir", "wal")?
            .set_default("fee_account", "00000000-0000-7000-8000-0000000000fe")?
            .set_default("auth.jwt_secret", "dev-secret")?
            .set_default("bus.channel_capacity", 1024)?
            .set_default("kyc.max_order_notional", "10000000")?
            .set_default("kyc.max_leverage", 100)?
            .set_default("rate_limits.place_order.burst", 20)?
            .set_default("rate_limits.place_order.per_second", 20.0)?
            .set_default("rate_limits.cancel_order.burst", 50)?
            .set_default("rate_limits.cancel_order.per_second", 50.0)?
            .set_default("rate_limits.wallet.burst", 10)?
            .set_default("rate_limits.wallet.per_second", 2.0)?
            .set_default("rate_limits.ws_connect.burst", 10)?
            .set_default("rate_limits.ws_connect.per_second", 1.0)?
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("MATCHCORE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let mut settings: Settings = config.try_deserialize()?;
        if settings.symbols.is_empty() {
            settings.symbols = default_symbols();
        }
        Ok(settings)
    }

    /// Parse the fee account id.
    pub fn fee_account_id(&self) -> Result<AccountId, config::ConfigError> {
        self.fee_account
            .parse()
            .map(AccountId::from_uuid)
            .map_err(|e| config::ConfigError::Message(format!("invalid fee_account: {}", e)))
    }

    /// Validate and convert symbol settings into engine configs.
    pub fn symbol_configs(&self) -> Result<HashMap<Symbol, SymbolConfig>, config::ConfigError> {
        let mut configs = HashMap::new();
        for entry in &self.symbols {
            let symbol = Symbol::try_new(entry.symbol.as_str()).ok_or_else(|| {
                config::ConfigError::Message(format!("invalid symbol: {}", entry.symbol))
            })?;
            if entry.price_tick <= Decimal::ZERO || entry.qty_step <= Decimal::ZERO {
                return Err(config::ConfigError::Message(format!(
                    "non-positive tick/step for {}",
                    entry.symbol
                )));
            }
            if entry.taker_fee_rate < entry.maker_fee_rate || entry.maker_fee_rate < Decimal::ZERO {
                return Err(config::ConfigError::Message(format!(
                    "invalid fee rates for {}",
                    entry.symbol
                )));
            }
            let config = SymbolConfig::new(
                symbol.clone(),
                entry.price_tick,
                entry.qty_step,
                FeeSchedule::new(entry.maker_fee_rate, entry.taker_fee_rate),
            );
            if configs.insert(symbol, config).is_some() {
                return Err(config::ConfigError::Message(format!(
                    "duplicate symbol: {}",
                    entry.symbol
                )));
            }
        }
        Ok(configs)
    }
}

fn default_symbols() -> Vec<SymbolSettings> {
    use rust_decimal::prelude::FromStr;
    vec![
        SymbolSettings {
            symbol: "BTC/USDT".into(),
            price_tick: Decimal::from_str("0.01").unwrap(),
            qty_step: Decimal::from_str("0.0001").unwrap(),
            maker_fee_rate: Decimal::from_str("0.0002").unwrap(),
            taker_fee_rate: Decimal::from_str("0.0005").unwrap(),
        },
        SymbolSettings {
            symbol: "ETH/USDT".into(),
            price_tick: Decimal::from_str("0.01").unwrap(),
            qty_step: Decimal::from_str("0.001").unwrap(),
            maker_fee_rate: Decimal::from_str("0.0002").unwrap(),
            taker_fee_rate: Decimal::from_str("0.0005").unwrap(),
        },
    ]
}
