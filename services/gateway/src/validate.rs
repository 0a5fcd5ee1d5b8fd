//! Order intent validation
//!
//! Checks run in order and return the first failure: symbol and type
//! shape, tick/step alignment, flag compatibility, leverage bounds, then
//! KYC limits. Only a fully validated intent reaches the ledger and the
//! book.

use crate::kyc::KycLimits;
use crate::models::PlaceOrderRequest;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromStr;
use types::errors::OrderError;
use types::ids::{AccountId, OrderId};
use types::market::SymbolConfig;
use types::numeric::{Price, Quantity};
use types::order::{Order, OrderType, Side, TimeInForce};

/// Build a validated order from an ingress request.
pub fn build_order(
    request: &PlaceOrderRequest,
    order_id: OrderId,
    account_id: AccountId,
    config: &SymbolConfig,
    limits: &KycLimits,
    now_ns: i64,
) -> Result<Order, OrderError> {
    let (order_type, forced_tif) = parse_order_type(&request.order_type)?;
    let time_in_force = resolve_time_in_force(request, forced_tif, now_ns)?;

    let quantity = parse_quantity(&request.qty, config)?;
    let price = parse_price(request, order_type, config)?;
    let stop_price = parse_stop_price(request, order_type, config)?;
    let quote_budget = parse_quote_budget(request, order_type)?;

    check_flags(request, order_type, time_in_force)?;
    check_leverage(request, limits)?;

    // KYC notional cap, where the intent's notional is knowable up front
    let notional = match (order_type, request.side) {
        (OrderType::Limit | OrderType::StopLimit, _) => {
            price.map(|p| quantity * p)
        }
        (OrderType::Market | OrderType::StopMarket, Side::BUY) => quote_budget,
        (OrderType::Market | OrderType::StopMarket, Side::SELL) => None,
    };
    if let Some(notional) = notional {
        if notional > limits.max_order_notional {
            return Err(OrderError::Unauthorized(format!(
                "order notional {} exceeds account limit",
                notional
            )));
        }
    }

    let mut order = Order::new(
        order_id,
        account_id,
        config.symbol.clone(),
        request.side,
        order_type,
        quantity,
        time_in_force,
        now_ns,
    )
    .with_flags(request.post_only, request.reduce_only);

    if let Some(price) = price {
        order = order.with_price(price);
    }
    if let Some(stop_price) = stop_price {
        let trigger = request
            .trigger
            .unwrap_or(types::order::TriggerReference::LastPrice);
        order = order.with_stop(stop_price, trigger);
    }
    if let Some(budget) = quote_budget {
        order = order.with_quote_budget(budget);
    }
    if let Some(client_order_id) = &request.client_order_id {
        order = order.with_client_order_id(client_order_id.clone());
    }

    Ok(order)
}

fn parse_order_type(raw: &str) -> Result<(OrderType, Option<TimeInForce>), OrderError> {
    match raw {
        "LIMIT" => Ok((OrderType::Limit, None)),
        "MARKET" => Ok((OrderType::Market, Some(TimeInForce::IOC))),
        "STOP_LIMIT" => Ok((OrderType::StopLimit, None)),
        "STOP_MARKET" => Ok((OrderType::StopMarket, Some(TimeInForce::IOC))),
        // IOC/FOK arrive as order types on the wire; internally they are
        // limit orders with the matching time-in-force
        "IOC" => Ok((OrderType::Limit, Some(TimeInForce::IOC))),
        "FOK" => Ok((OrderType::Limit, Some(TimeInForce::FOK))),
        other => Err(OrderError::UnknownType(other.to_string())),
    }
}

fn resolve_time_in_force(
    request: &PlaceOrderRequest,
    forced: Option<TimeInForce>,
    now_ns: i64,
) -> Result<TimeInForce, OrderError> {
    let requested = match request.time_in_force.as_deref() {
        None => None,
        Some("GTC") => Some(TimeInForce::GTC),
        Some("IOC") => Some(TimeInForce::IOC),
        Some("FOK") => Some(TimeInForce::FOK),
        Some("GTD") => {
            let deadline = request.expires_at_ns.ok_or_else(|| {
                OrderError::InvalidFlags("GTD requires expires_at_ns".into())
            })?;
            if deadline <= now_ns {
                return Err(OrderError::InvalidFlags("GTD deadline is in the past".into()));
            }
            Some(TimeInForce::GTD(deadline))
        }
        Some(other) => {
            return Err(OrderError::InvalidFlags(format!(
                "unknown time_in_force: {}",
                other
            )))
        }
    };

    match (forced, requested) {
        (Some(forced), None) => Ok(forced),
        (Some(forced), Some(requested)) if forced == requested => Ok(forced),
        (Some(_), Some(_)) => Err(OrderError::InvalidFlags(
            "time_in_force conflicts with order type".into(),
        )),
        (None, requested) => Ok(requested.unwrap_or(TimeInForce::GTC)),
    }
}

fn parse_quantity(raw: &str, config: &SymbolConfig) -> Result<Quantity, OrderError> {
    let value = Decimal::from_str(raw)
        .map_err(|_| OrderError::InvalidQty(format!("unparseable quantity: {}", raw)))?;
    let quantity = Quantity::try_new(value)
        .ok_or_else(|| OrderError::InvalidQty("quantity must be positive".into()))?;
    if !quantity.is_aligned(config.qty_step) {
        return Err(OrderError::InvalidQty(format!(
            "quantity {} not aligned to step {}",
            quantity, config.qty_step
        )));
    }
    Ok(quantity)
}

fn parse_price(
    request: &PlaceOrderRequest,
    order_type: OrderType,
    config: &SymbolConfig,
) -> Result<Option<Price>, OrderError> {
    match order_type {
        OrderType::Limit | OrderType::StopLimit => {
            let raw = request
                .price
                .as_deref()
                .ok_or_else(|| OrderError::InvalidPrice("price required".into()))?;
            let value = Decimal::from_str(raw)
                .map_err(|_| OrderError::InvalidPrice(format!("unparseable price: {}", raw)))?;
            let price = Price::try_new(value)
                .ok_or_else(|| OrderError::InvalidPrice("price must be positive".into()))?;
            if !price.is_aligned(config.price_tick) {
                return Err(OrderError::InvalidPrice(format!(
                    "price {} not aligned to tick {}",
                    price, config.price_tick
                )));
            }
            Ok(Some(price))
        }
        OrderType::Market | OrderType::StopMarket => {
            if request.price.is_some() {
                return Err(OrderError::InvalidPrice(
                    "price not allowed for market orders".into(),
                ));
            }
            Ok(None)
        }
    }
}

fn parse_stop_price(
    request: &PlaceOrderRequest,
    order_type: OrderType,
    config: &SymbolConfig,
) -> Result<Option<Price>, OrderError> {
    match order_type {
        OrderType::StopLimit | OrderType::StopMarket => {
            let raw = request
                .stop_price
                .as_deref()
                .ok_or_else(|| OrderError::InvalidPrice("stop_price required".into()))?;
            let value = Decimal::from_str(raw)
                .map_err(|_| OrderError::InvalidPrice(format!("unparseable stop price: {}", raw)))?;
            let stop = Price::try_new(value)
                .ok_or_else(|| OrderError::InvalidPrice("stop_price must be positive".into()))?;
            if !stop.is_aligned(config.price_tick) {
                return Err(OrderError::InvalidPrice(format!(
                    "stop_price {} not aligned to tick {}",
                    stop, config.price_tick
                )));
            }
            Ok(Some(stop))
        }
        _ => {
            if request.stop_price.is_some() {
                return Err(OrderError::InvalidPrice(
                    "stop_price only valid for stop orders".into(),
                ));
            }
            Ok(None)
        }
    }
}

fn parse_quote_budget(
    request: &PlaceOrderRequest,
    order_type: OrderType,
) -> Result<Option<Decimal>, OrderError> {
    let is_market_buy = matches!(order_type, OrderType::Market | OrderType::StopMarket)
        && request.side == Side::BUY;
    match (&request.quote_budget, is_market_buy) {
        (Some(raw), true) => {
            let budget = Decimal::from_str(raw)
                .map_err(|_| OrderError::InvalidQty(format!("unparseable quote_budget: {}", raw)))?;
            if budget <= Decimal::ZERO {
                return Err(OrderError::InvalidQty("quote_budget must be positive".into()));
            }
            Ok(Some(budget))
        }
        (None, true) => Err(OrderError::InvalidQty(
            "quote_budget required for market buys".into(),
        )),
        (Some(_), false) => Err(OrderError::InvalidFlags(
            "quote_budget only valid for market buys".into(),
        )),
        (None, false) => Ok(None),
    }
}

fn check_flags(
    request: &PlaceOrderRequest,
    order_type: OrderType,
    time_in_force: TimeInForce,
) -> Result<(), OrderError> {
    if request.post_only {
        let immediate = matches!(order_type, OrderType::Market | OrderType::StopMarket)
            || matches!(time_in_force, TimeInForce::IOC | TimeInForce::FOK);
        if immediate {
            return Err(OrderError::InvalidFlags(
                "post_only is incompatible with MARKET, IOC, and FOK".into(),
            ));
        }
    }
    Ok(())
}

fn check_leverage(request: &PlaceOrderRequest, limits: &KycLimits) -> Result<u32, OrderError> {
    let leverage = request.leverage.unwrap_or(1);
    if !(1..=100).contains(&leverage) {
        return Err(OrderError::InvalidLeverage(format!(
            "leverage {} outside [1, 100]",
            leverage
        )));
    }
    if leverage > limits.max_leverage {
        return Err(OrderError::Unauthorized(format!(
            "leverage {} exceeds account limit {}",
            leverage, limits.max_leverage
        )));
    }
    Ok(leverage)
}
