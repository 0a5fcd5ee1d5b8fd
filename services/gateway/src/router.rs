use crate::handlers::{account, order, wallet, ws};
use crate::state::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/orders", post(order::create_order))
        .route("/orders/{id}", delete(order::cancel_order).get(order::get_order))
        .route("/accounts/{id}/balances", get(account::get_balances))
        .route("/wallet/deposits", post(wallet::deposit))
        .route("/wallet/withdrawals", post(wallet::withdraw))
        .route("/ws", get(ws::ws_handler));

    Router::new()
        .nest("/v1", api_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
