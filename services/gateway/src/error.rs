//! Wire error mapping
//!
//! Every user-facing failure carries a stable `error` code and a free-form
//! `message`. Internal details never leak: ledger inconsistencies and other
//! bugs collapse to `INTERNAL_ERROR`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use types::errors::{LedgerError, OrderError};

/// Central error type for the gateway
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("internal error")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, extra) = match &self {
            AppError::Order(err) => {
                let status = match err {
                    OrderError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
                    OrderError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                    OrderError::NotFound => StatusCode::NOT_FOUND,
                    OrderError::DuplicateClientOrderId { .. } => StatusCode::CONFLICT,
                    OrderError::SymbolHalted => StatusCode::SERVICE_UNAVAILABLE,
                    _ => StatusCode::BAD_REQUEST,
                };
                let extra = match err {
                    OrderError::DuplicateClientOrderId { order_id, .. } => {
                        Some(json!({ "order_id": order_id }))
                    }
                    _ => None,
                };
                (status, err.code(), err.to_string(), extra)
            }
            AppError::Ledger(LedgerError::InsufficientFunds { .. }) => (
                StatusCode::BAD_REQUEST,
                "INSUFFICIENT_FUNDS",
                self.to_string(),
                None,
            ),
            AppError::Ledger(_) | AppError::Internal(_) => {
                tracing::error!(error = %self, "internal gateway error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "internal error".to_string(),
                    None,
                )
            }
        };

        let mut body = json!({
            "error": code,
            "message": message,
        });
        if let Some(extra) = extra {
            if let (Some(object), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
                for (key, value) in extra {
                    object.insert(key.clone(), value.clone());
                }
            }
        }

        (status, Json(body)).into_response()
    }
}
