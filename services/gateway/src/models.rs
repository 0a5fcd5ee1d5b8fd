//! Request and response shapes for the order RPC surface
//!
//! Decimal fields arrive as strings and are parsed during validation so
//! malformed values map to precise error codes instead of a generic 422.

use serde::{Deserialize, Serialize};
use types::ids::OrderId;
use types::order::{OrderStatus, Side, TriggerReference};

#[derive(Debug, Clone, Deserialize)]
pub struct PlaceOrderRequest {
    pub symbol: String,
    pub side: Side,
    /// LIMIT, MARKET, STOP_LIMIT, STOP_MARKET, IOC, or FOK
    #[serde(rename = "type")]
    pub order_type: String,
    pub qty: String,
    pub price: Option<String>,
    pub stop_price: Option<String>,
    pub trigger: Option<TriggerReference>,
    /// GTC (default), IOC, FOK, or GTD
    pub time_in_force: Option<String>,
    /// Expiry deadline in Unix nanos; required with GTD
    pub expires_at_ns: Option<i64>,
    #[serde(default)]
    pub post_only: bool,
    #[serde(default)]
    pub reduce_only: bool,
    pub client_order_id: Option<String>,
    /// Quote spend cap; required for market buys
    pub quote_budget: Option<String>,
    pub leverage: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaceOrderResponse {
    pub order_id: OrderId,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelOrderResponse {
    pub order_id: OrderId,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletRequest {
    pub asset: String,
    pub amount: String,
    pub external_ref: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_place_order_request_minimal() {
        let json = r#"{
            "symbol": "BTC/USDT",
            "side": "BUY",
            "type": "LIMIT",
            "qty": "1.0",
            "price": "50000.00"
        }"#;
        let req: PlaceOrderRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.order_type, "LIMIT");
        assert!(!req.post_only);
        assert!(req.time_in_force.is_none());
    }

    #[test]
    fn test_place_order_request_full() {
        let json = r#"{
            "symbol": "BTC/USDT",
            "side": "SELL",
            "type": "STOP_MARKET",
            "qty": "0.5",
            "stop_price": "90.00",
            "trigger": "LAST_PRICE",
            "time_in_force": "GTC",
            "post_only": false,
            "reduce_only": true,
            "client_order_id": "my-stop-1"
        }"#;
        let req: PlaceOrderRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.trigger, Some(TriggerReference::LastPrice));
        assert!(req.reduce_only);
    }
}
