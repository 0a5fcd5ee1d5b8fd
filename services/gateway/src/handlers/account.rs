//! Balance queries

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use ledger::BalanceChange;
use types::errors::OrderError;
use types::ids::AccountId;

pub async fn get_balances(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(account_id): Path<String>,
) -> Result<Json<Vec<BalanceChange>>, AppError> {
    let account_id: AccountId = account_id
        .parse()
        .map(AccountId::from_uuid)
        .map_err(|_| OrderError::Unauthorized("invalid account id".into()))?;

    if account_id != user.account_id {
        return Err(OrderError::Unauthorized("cannot read another account's balances".into()).into());
    }

    Ok(Json(state.ledger.balances_for(account_id)))
}
