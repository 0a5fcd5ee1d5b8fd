//! Deposit and withdrawal collaborators
//!
//! Ledger-only operations outside the matching critical section; on-chain
//! movement is the wallet collaborator's business. Both calls are
//! idempotent on `external_ref`.

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::models::WalletRequest;
use crate::rate_limit::Endpoint;
use crate::state::AppState;
use axum::{extract::State, Json};
use ledger::BalanceChange;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromStr;
use types::errors::OrderError;
use types::market::Asset;

fn parse_request(payload: &WalletRequest) -> Result<(Asset, Decimal), AppError> {
    let asset = Asset::try_new(payload.asset.as_str())
        .ok_or_else(|| OrderError::InvalidSymbol(payload.asset.clone()))?;
    let amount = Decimal::from_str(&payload.amount)
        .ok()
        .filter(|amount| *amount > Decimal::ZERO)
        .ok_or_else(|| OrderError::InvalidQty(format!("invalid amount: {}", payload.amount)))?;
    Ok((asset, amount))
}

pub async fn deposit(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<WalletRequest>,
) -> Result<Json<BalanceChange>, AppError> {
    state.rate_limiter.check(user.account_id, Endpoint::Wallet)?;

    let (asset, amount) = parse_request(&payload)?;
    let change = state
        .wallet
        .deposit(user.account_id, asset, amount, &payload.external_ref)?;
    Ok(Json(change))
}

pub async fn withdraw(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<WalletRequest>,
) -> Result<Json<BalanceChange>, AppError> {
    state.rate_limiter.check(user.account_id, Endpoint::Wallet)?;

    let (asset, amount) = parse_request(&payload)?;
    let change = state
        .wallet
        .withdraw(user.account_id, asset, amount, &payload.external_ref)?;
    Ok(Json(change))
}
