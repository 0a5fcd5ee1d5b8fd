//! Assets, symbols, and per-symbol trading parameters

use crate::fee::FeeSchedule;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque uppercase asset identifier (e.g. "BTC", "USDT")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Asset(String);

impl Asset {
    /// Create a new Asset
    ///
    /// # Panics
    /// Panics if the identifier is empty or not uppercase alphanumeric
    pub fn new(code: impl Into<String>) -> Self {
        let code = code.into();
        assert!(
            !code.is_empty() && code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()),
            "Asset must be uppercase alphanumeric"
        );
        Self(code)
    }

    /// Try to create an Asset, returning None if invalid
    pub fn try_new(code: impl Into<String>) -> Option<Self> {
        let code = code.into();
        if !code.is_empty() && code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()) {
            Some(Self(code))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trading pair symbol in "BASE/QUOTE" form (e.g. "BTC/USDT")
///
/// The book trades the base asset against the quote asset.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Create a new Symbol
    ///
    /// # Panics
    /// Panics if the format is not BASE/QUOTE with valid asset codes
    pub fn new(symbol: impl Into<String>) -> Self {
        Self::try_new(symbol).expect("Symbol must be in BASE/QUOTE format")
    }

    /// Try to create a Symbol, returning None if invalid
    pub fn try_new(symbol: impl Into<String>) -> Option<Self> {
        let s = symbol.into();
        let (base, quote) = s.split_once('/')?;
        if Asset::try_new(base).is_some() && Asset::try_new(quote).is_some() && base != quote {
            Some(Self(s))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The base asset (the asset being traded).
    pub fn base(&self) -> Asset {
        let (base, _) = self.0.split_once('/').expect("validated at construction");
        Asset::new(base)
    }

    /// The quote asset (the asset the price is denominated in).
    pub fn quote(&self) -> Asset {
        let (_, quote) = self.0.split_once('/').expect("validated at construction");
        Asset::new(quote)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Per-symbol trading parameters.
///
/// `price_tick` and `qty_step` are the smallest allowed increments for
/// prices and quantities on this symbol; every order must be aligned to
/// them and fees are floored to the price tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolConfig {
    pub symbol: Symbol,
    pub price_tick: Decimal,
    pub qty_step: Decimal,
    pub fees: FeeSchedule,
}

impl SymbolConfig {
    pub fn new(symbol: Symbol, price_tick: Decimal, qty_step: Decimal, fees: FeeSchedule) -> Self {
        assert!(price_tick > Decimal::ZERO, "price_tick must be positive");
        assert!(qty_step > Decimal::ZERO, "qty_step must be positive");
        Self {
            symbol,
            price_tick,
            qty_step,
            fees,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::prelude::FromStr;

    #[test]
    fn test_asset_creation() {
        let asset = Asset::new("BTC");
        assert_eq!(asset.as_str(), "BTC");
    }

    #[test]
    #[should_panic(expected = "Asset must be uppercase alphanumeric")]
    fn test_asset_lowercase_panics() {
        Asset::new("btc");
    }

    #[test]
    fn test_symbol_split() {
        let symbol = Symbol::new("BTC/USDT");
        assert_eq!(symbol.base().as_str(), "BTC");
        assert_eq!(symbol.quote().as_str(), "USDT");
    }

    #[test]
    fn test_symbol_try_new() {
        assert!(Symbol::try_new("BTC/USDT").is_some());
        assert!(Symbol::try_new("INVALID").is_none());
        assert!(Symbol::try_new("btc/usdt").is_none());
        assert!(Symbol::try_new("BTC/BTC").is_none());
    }

    #[test]
    fn test_symbol_serialization() {
        let symbol = Symbol::new("ETH/USDC");
        let json = serde_json::to_string(&symbol).unwrap();
        assert_eq!(json, "\"ETH/USDC\"");

        let deserialized: Symbol = serde_json::from_str(&json).unwrap();
        assert_eq!(symbol, deserialized);
    }

    #[test]
    fn test_symbol_config() {
        let cfg = SymbolConfig::new(
            Symbol::new("BTC/USDT"),
            Decimal::from_str("0.01").unwrap(),
            Decimal::from_str("0.0001").unwrap(),
            FeeSchedule::zero(),
        );
        assert_eq!(cfg.symbol.as_str(), "BTC/USDT");
    }
}
