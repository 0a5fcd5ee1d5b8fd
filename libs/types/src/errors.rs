//! Error taxonomy with stable wire codes
//!
//! User-facing errors carry a stable `code` and a free-form message; the
//! core never leaks internal identifiers through them. Internal
//! inconsistencies are a separate class that halts the affected symbol.

use crate::ids::OrderId;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors returned synchronously from order placement and cancellation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrderError {
    #[error("unknown symbol: {0}")]
    InvalidSymbol(String),

    #[error("invalid price: {0}")]
    InvalidPrice(String),

    #[error("invalid quantity: {0}")]
    InvalidQty(String),

    #[error("unknown order type: {0}")]
    UnknownType(String),

    #[error("invalid flags: {0}")]
    InvalidFlags(String),

    #[error("invalid leverage: {0}")]
    InvalidLeverage(String),

    #[error("post-only order would take liquidity")]
    WouldCross,

    #[error("order would not fill completely")]
    WouldNotFill,

    #[error("insufficient funds in {asset}: required {required}, available {available}")]
    InsufficientFunds {
        asset: String,
        required: Decimal,
        available: Decimal,
    },

    #[error("order not found")]
    NotFound,

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("duplicate client order id {client_order_id} (order {order_id})")]
    DuplicateClientOrderId {
        client_order_id: String,
        order_id: OrderId,
    },

    #[error("symbol halted")]
    SymbolHalted,
}

impl OrderError {
    /// Stable wire code
    pub fn code(&self) -> &'static str {
        match self {
            OrderError::InvalidSymbol(_) => "INVALID_SYMBOL",
            OrderError::InvalidPrice(_) => "INVALID_PRICE",
            OrderError::InvalidQty(_) => "INVALID_QTY",
            OrderError::UnknownType(_) => "UNKNOWN_TYPE",
            OrderError::InvalidFlags(_) => "INVALID_FLAGS",
            OrderError::InvalidLeverage(_) => "INVALID_LEVERAGE",
            OrderError::WouldCross => "WOULD_CROSS",
            OrderError::WouldNotFill => "WOULD_NOT_FILL",
            OrderError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            OrderError::NotFound => "NOT_FOUND",
            OrderError::RateLimited => "RATE_LIMITED",
            OrderError::Unauthorized(_) => "UNAUTHORIZED",
            OrderError::DuplicateClientOrderId { .. } => "DUPLICATE_CLIENT_ORDER_ID",
            OrderError::SymbolHalted => "SYMBOL_HALTED",
        }
    }
}

/// Ledger-level errors
///
/// `Inconsistent` means an internal invariant was violated (reserved
/// underflow); the owning symbol task halts on it and waits for operator
/// intervention.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("insufficient funds in {asset}: required {required}, available {available}")]
    InsufficientFunds {
        asset: String,
        required: Decimal,
        available: Decimal,
    },

    #[error("ledger inconsistency: {detail}")]
    Inconsistent { detail: String },

    #[error("duplicate external reference: {external_ref}")]
    DuplicateExternalRef { external_ref: String },
}

impl LedgerError {
    /// Whether this error is fatal for the task that triggered it
    pub fn is_fatal(&self) -> bool {
        matches!(self, LedgerError::Inconsistent { .. })
    }
}

/// Engine-level errors surfaced by a symbol task
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("symbol {symbol} is halted")]
    Halted { symbol: String },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
