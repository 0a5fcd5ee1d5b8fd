//! Order placement, cancellation, and queries
//!
//! The submit pipeline: rate limit → shape/KYC validation → duplicate
//! client-order-id check → reservation → enqueue to the owning symbol task
//! → reply with the engine's resulting status.

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::models::{CancelOrderResponse, PlaceOrderRequest, PlaceOrderResponse};
use crate::rate_limit::Endpoint;
use crate::runtime::now_ns;
use crate::state::{AppState, OrderRoute};
use crate::validate;
use axum::{
    extract::{Path, State},
    Json,
};
use matching_engine::{engine::reservation_for, CommandOutcome, EngineCommand};
use types::errors::OrderError;
use types::ids::{AccountId, OrderId};
use types::market::Symbol;
use types::order::{Order, OrderStatus, RejectReason};

pub async fn create_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<PlaceOrderRequest>,
) -> Result<Json<PlaceOrderResponse>, AppError> {
    state
        .rate_limiter
        .check(user.account_id, Endpoint::PlaceOrder)?;

    let symbol = Symbol::try_new(payload.symbol.as_str())
        .ok_or_else(|| OrderError::InvalidSymbol(payload.symbol.clone()))?;
    let config = state
        .symbols
        .get(&symbol)
        .ok_or_else(|| OrderError::InvalidSymbol(payload.symbol.clone()))?;

    let limits = state.kyc.limits(user.account_id);
    let order_id = state.next_order_id();
    let order = validate::build_order(&payload, order_id, user.account_id, config, &limits, now_ns())?;

    // PlaceOrder is not idempotent: a repeated client_order_id names the
    // original order instead of creating a second one.
    if let Some(client_order_id) = order.client_order_id.clone() {
        match state
            .client_orders
            .entry((user.account_id, client_order_id.clone()))
        {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                return Err(OrderError::DuplicateClientOrderId {
                    client_order_id,
                    order_id: *existing.get(),
                }
                .into());
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(order_id);
            }
        }
    }

    let (reserve_asset, reserved) = match reservation_for(config, &order) {
        Ok(reservation) => reservation,
        Err(err) => {
            forget_order(&state, &order, user.account_id);
            return Err(err.into());
        }
    };
    if let Err(err) = state
        .ledger
        .reserve(user.account_id, reserve_asset, reserved)
    {
        forget_order(&state, &order, user.account_id);
        return Err(err.into());
    }

    state.order_router.insert(
        order_id,
        OrderRoute {
            symbol: symbol.clone(),
            account_id: user.account_id,
        },
    );

    let handle = state
        .engines
        .get(&symbol)
        .expect("every configured symbol has an engine task");
    let outcome = match handle.call(EngineCommand::Place { order: order.clone(), reserved }).await {
        Ok(outcome) => outcome,
        Err(err) => {
            // The symbol task is gone; the reservation stays pending
            // operator intervention, like every other halt artifact.
            forget_order(&state, &order, user.account_id);
            return Err(err);
        }
    };

    match outcome {
        CommandOutcome::Placed(placed) => match placed.status {
            OrderStatus::Rejected(reason) => {
                // Engine released the reservation; the request never took
                // effect, so the client_order_id is reusable.
                forget_order(&state, &order, user.account_id);
                Err(reject_error(reason).into())
            }
            status => Ok(Json(PlaceOrderResponse { order_id, status })),
        },
        CommandOutcome::Halted => {
            forget_order(&state, &order, user.account_id);
            Err(OrderError::SymbolHalted.into())
        }
        other => {
            tracing::error!(?other, "unexpected engine outcome for place");
            Err(AppError::Internal("unexpected engine outcome".into()))
        }
    }
}

pub async fn cancel_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<Json<CancelOrderResponse>, AppError> {
    state
        .rate_limiter
        .check(user.account_id, Endpoint::CancelOrder)?;

    let order_id = resolve_order_id(&state, user.account_id, &id)?;
    let route = state
        .order_router
        .get(&order_id)
        .map(|r| r.clone())
        .ok_or(OrderError::NotFound)?;
    // Foreign orders are indistinguishable from unknown ones
    if route.account_id != user.account_id {
        return Err(OrderError::NotFound.into());
    }

    let handle = state
        .engines
        .get(&route.symbol)
        .ok_or(OrderError::NotFound)?;
    match handle.call(EngineCommand::Cancel { order_id }).await? {
        CommandOutcome::Cancelled(order) => Ok(Json(CancelOrderResponse {
            order_id: order.order_id,
            status: order.status,
        })),
        CommandOutcome::NotFound => Err(OrderError::NotFound.into()),
        CommandOutcome::Halted => Err(OrderError::SymbolHalted.into()),
        other => {
            tracing::error!(?other, "unexpected engine outcome for cancel");
            Err(AppError::Internal("unexpected engine outcome".into()))
        }
    }
}

pub async fn get_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<Json<Order>, AppError> {
    let order_id = resolve_order_id(&state, user.account_id, &id)?;
    let route = state
        .order_router
        .get(&order_id)
        .map(|r| r.clone())
        .ok_or(OrderError::NotFound)?;
    if route.account_id != user.account_id {
        return Err(OrderError::NotFound.into());
    }

    let handle = state
        .engines
        .get(&route.symbol)
        .ok_or(OrderError::NotFound)?;
    match handle.call(EngineCommand::Query { order_id }).await? {
        CommandOutcome::OrderSnapshot(order) => Ok(Json(*order)),
        CommandOutcome::NotFound => Err(OrderError::NotFound.into()),
        CommandOutcome::Halted => Err(OrderError::SymbolHalted.into()),
        other => {
            tracing::error!(?other, "unexpected engine outcome for query");
            Err(AppError::Internal("unexpected engine outcome".into()))
        }
    }
}

/// A path id is either a numeric order id or a caller-scoped client id.
fn resolve_order_id(state: &AppState, user: AccountId, id: &str) -> Result<OrderId, AppError> {
    if let Ok(numeric) = id.parse::<u64>() {
        return Ok(OrderId::new(numeric));
    }
    state
        .client_orders
        .get(&(user, id.to_string()))
        .map(|entry| *entry.value())
        .ok_or_else(|| OrderError::NotFound.into())
}

fn forget_order(state: &AppState, order: &Order, user: AccountId) {
    state.order_router.remove(&order.order_id);
    if let Some(client_order_id) = &order.client_order_id {
        state.client_orders.remove(&(user, client_order_id.clone()));
    }
}

fn reject_error(reason: RejectReason) -> OrderError {
    match reason {
        RejectReason::WouldCross => OrderError::WouldCross,
        RejectReason::WouldNotFill => OrderError::WouldNotFill,
        RejectReason::SymbolHalted => OrderError::SymbolHalted,
    }
}
