//! Channels and wire frames
//!
//! Subscribers address streams by channel name:
//! - `book:{symbol}`: depth deltas (public)
//! - `trades:{symbol}`: trade prints (public)
//! - `orders:{user}`: order status changes (private)
//! - `balances:{user}`: balance changes (private)
//!
//! Every frame is `{channel, seq, ts_ns, payload}` with the per-symbol
//! event sequence, so consumers can resynchronize against snapshots.

use matching_engine::{EngineEvent, MatchStep};
use serde::{Deserialize, Serialize};
use serde_json::json;
use types::ids::AccountId;
use types::market::Symbol;

/// A subscription channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
    Book { symbol: Symbol },
    Trades { symbol: Symbol },
    Orders { user: AccountId },
    Balances { user: AccountId },
}

impl Channel {
    /// Parse a channel name.
    ///
    /// Formats: `book:BTC/USDT`, `trades:BTC/USDT`, `orders:{uuid}`,
    /// `balances:{uuid}`.
    pub fn parse(s: &str) -> Option<Self> {
        let (kind, rest) = s.split_once(':')?;
        match kind {
            "book" => Some(Channel::Book {
                symbol: Symbol::try_new(rest)?,
            }),
            "trades" => Some(Channel::Trades {
                symbol: Symbol::try_new(rest)?,
            }),
            "orders" => Some(Channel::Orders {
                user: AccountId::from_uuid(rest.parse().ok()?),
            }),
            "balances" => Some(Channel::Balances {
                user: AccountId::from_uuid(rest.parse().ok()?),
            }),
            _ => None,
        }
    }

    /// Canonical channel name.
    pub fn name(&self) -> String {
        match self {
            Channel::Book { symbol } => format!("book:{}", symbol),
            Channel::Trades { symbol } => format!("trades:{}", symbol),
            Channel::Orders { user } => format!("orders:{}", user),
            Channel::Balances { user } => format!("balances:{}", user),
        }
    }

    /// The identity a subscriber must hold for this channel, if any.
    pub fn required_user(&self) -> Option<AccountId> {
        match self {
            Channel::Orders { user } | Channel::Balances { user } => Some(*user),
            _ => None,
        }
    }
}

/// One event frame on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    pub channel: String,
    pub seq: u64,
    pub ts_ns: i64,
    pub payload: serde_json::Value,
}

/// Map a committed step onto its channel frames.
///
/// `OrderAccepted` and `StopShelved` are log-only (the book change is
/// carried by the accompanying delta, the owner by the order update);
/// everything else fans out to exactly one channel.
pub fn frames_for_step(step: &MatchStep) -> Vec<(Channel, EventFrame)> {
    let mut frames = Vec::new();

    for event in &step.events {
        let routed = match &event.event {
            EngineEvent::Trade(trade) => Some((
                Channel::Trades {
                    symbol: step.symbol.clone(),
                },
                serde_json::to_value(trade).expect("trade serializes"),
            )),
            EngineEvent::BookDelta { side, price, size } => Some((
                Channel::Book {
                    symbol: step.symbol.clone(),
                },
                json!({
                    "side": side,
                    "price": price,
                    "size": size.to_string(),
                }),
            )),
            EngineEvent::OrderUpdate {
                order_id,
                account_id,
                status,
                filled_quantity,
                avg_fill_price,
            } => Some((
                Channel::Orders { user: *account_id },
                json!({
                    "order_id": order_id,
                    "status": status,
                    "filled_quantity": filled_quantity,
                    "avg_fill_price": avg_fill_price,
                }),
            )),
            EngineEvent::BalanceUpdate(change) => Some((
                Channel::Balances {
                    user: change.account_id,
                },
                json!({
                    "asset": change.asset,
                    "available": change.available.to_string(),
                    "reserved": change.reserved.to_string(),
                }),
            )),
            EngineEvent::SymbolHalted { detail } => Some((
                Channel::Book {
                    symbol: step.symbol.clone(),
                },
                json!({ "halted": true, "detail": detail }),
            )),
            EngineEvent::OrderAccepted { .. } | EngineEvent::StopShelved { .. } => None,
        };

        if let Some((channel, payload)) = routed {
            let frame = EventFrame {
                channel: channel.name(),
                seq: event.seq,
                ts_ns: event.ts_ns,
                payload,
            };
            frames.push((channel, frame));
        }
    }

    frames
}

/// Messages a websocket client may send.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { channels: Vec<String> },
    Unsubscribe { channels: Vec<String> },
    Ping,
}

/// Control messages the server sends alongside event frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ServerMessage {
    Subscribed { channels: Vec<String> },
    Unsubscribed { channels: Vec<String> },
    Pong { ts_ns: i64 },
    Error { code: String, message: String },
    Closed { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger::BalanceChange;
    use rust_decimal::Decimal;
    use types::ids::{OrderId, TradeId};
    use types::market::Asset;
    use types::numeric::{Price, Quantity};
    use types::order::{OrderStatus, Side};
    use types::trade::Trade;

    #[test]
    fn test_channel_parse_roundtrip() {
        let book = Channel::parse("book:BTC/USDT").unwrap();
        assert_eq!(book.name(), "book:BTC/USDT");
        assert!(book.required_user().is_none());

        let user = AccountId::new();
        let orders = Channel::parse(&format!("orders:{}", user)).unwrap();
        assert_eq!(orders.required_user(), Some(user));

        assert!(Channel::parse("book:invalid").is_none());
        assert!(Channel::parse("candles:BTC/USDT").is_none());
        assert!(Channel::parse("orders:not-a-uuid").is_none());
    }

    #[test]
    fn test_frames_route_by_event_kind() {
        let user = AccountId::new();
        let other = AccountId::new();
        let symbol = Symbol::new("BTC/USDT");
        let mut step = MatchStep::new(symbol.clone());
        let mut seq = 0u64;

        step.push(
            &mut seq,
            1,
            EngineEvent::Trade(Trade::new(
                TradeId::new(1),
                1,
                symbol.clone(),
                OrderId::new(1),
                OrderId::new(2),
                user,
                other,
                Side::BUY,
                Price::from_u64(50000),
                Quantity::from_str("1").unwrap(),
                Decimal::ZERO,
                Decimal::ZERO,
                1,
            )),
        );
        step.push(
            &mut seq,
            1,
            EngineEvent::BookDelta {
                side: Side::SELL,
                price: Price::from_u64(50000),
                size: Decimal::ZERO,
            },
        );
        step.push(
            &mut seq,
            1,
            EngineEvent::OrderUpdate {
                order_id: OrderId::new(1),
                account_id: user,
                status: OrderStatus::Filled,
                filled_quantity: Quantity::from_str("1").unwrap(),
                avg_fill_price: Some(Price::from_u64(50000)),
            },
        );
        step.push(
            &mut seq,
            1,
            EngineEvent::BalanceUpdate(BalanceChange {
                account_id: other,
                asset: Asset::new("USDT"),
                available: Decimal::from(1),
                reserved: Decimal::ZERO,
            }),
        );

        let frames = frames_for_step(&step);
        assert_eq!(frames.len(), 4);
        assert!(matches!(frames[0].0, Channel::Trades { .. }));
        assert!(matches!(frames[1].0, Channel::Book { .. }));
        assert_eq!(frames[2].0, Channel::Orders { user });
        assert_eq!(frames[3].0, Channel::Balances { user: other });

        // Frames keep the step's seq numbers
        assert_eq!(frames[0].1.seq, 1);
        assert_eq!(frames[3].1.seq, 4);
    }

    #[test]
    fn test_client_message_parsing() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"op":"subscribe","channels":["book:BTC/USDT"]}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Subscribe { .. }));

        let msg: ClientMessage = serde_json::from_str(r#"{"op":"ping"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));
    }

    #[test]
    fn test_pong_carries_timestamp() {
        let json = serde_json::to_string(&ServerMessage::Pong { ts_ns: 42 }).unwrap();
        assert!(json.contains("\"ts_ns\":42"));
    }
}
