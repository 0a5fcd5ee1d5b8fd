//! Websocket subscription endpoint
//!
//! One socket per client. Flow: authenticate on upgrade → subscribe →
//! snapshot (book channels) → deltas. Each subscription runs its own
//! forwarder task off the bus; a forwarder that observes broadcast lag
//! closes the connection with a `lagged` reason rather than letting the
//! client silently miss frames.

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::rate_limit::Endpoint;
use crate::runtime::now_ns;
use crate::state::AppState;
use axum::{
    extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
    extract::State,
    response::Response,
};
use futures::{SinkExt, StreamExt};
use market_data::events::{ClientMessage, ServerMessage};
use market_data::{Channel, EventFrame};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use types::ids::AccountId;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Response, AppError> {
    state
        .rate_limiter
        .check(user.account_id, Endpoint::WsConnect)?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user.account_id)))
}

async fn handle_socket(socket: WebSocket, state: AppState, user: AccountId) {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(256);

    // Single writer task; closes the sink after forwarding a Close frame.
    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let is_close = matches!(message, Message::Close(_));
            if sink.send(message).await.is_err() || is_close {
                break;
            }
        }
    });

    let mut forwarders: HashMap<String, JoinHandle<()>> = HashMap::new();

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => {
                let Ok(client_message) = serde_json::from_str::<ClientMessage>(text.as_str())
                else {
                    send_control(
                        &out_tx,
                        ServerMessage::Error {
                            code: "BAD_MESSAGE".into(),
                            message: "unparseable message".into(),
                        },
                    )
                    .await;
                    continue;
                };

                match client_message {
                    ClientMessage::Subscribe { channels } => {
                        let mut accepted = Vec::new();
                        for name in channels {
                            match subscribe_channel(&state, user, &name, &out_tx).await {
                                Ok(handle) => {
                                    if let Some(previous) = forwarders.insert(name.clone(), handle)
                                    {
                                        previous.abort();
                                    }
                                    accepted.push(name);
                                }
                                Err(server_error) => {
                                    send_control(&out_tx, server_error).await;
                                }
                            }
                        }
                        if !accepted.is_empty() {
                            send_control(&out_tx, ServerMessage::Subscribed { channels: accepted })
                                .await;
                        }
                    }
                    ClientMessage::Unsubscribe { channels } => {
                        let mut removed = Vec::new();
                        for name in channels {
                            if let Some(handle) = forwarders.remove(&name) {
                                handle.abort();
                                removed.push(name);
                            }
                        }
                        send_control(&out_tx, ServerMessage::Unsubscribed { channels: removed })
                            .await;
                    }
                    ClientMessage::Ping => {
                        send_control(&out_tx, ServerMessage::Pong { ts_ns: now_ns() }).await;
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    for (_, handle) in forwarders {
        handle.abort();
    }
    writer.abort();
}

/// Resolve, authorize, and start one channel subscription.
async fn subscribe_channel(
    state: &AppState,
    user: AccountId,
    name: &str,
    out_tx: &mpsc::Sender<Message>,
) -> Result<JoinHandle<()>, ServerMessage> {
    let Some(channel) = Channel::parse(name) else {
        return Err(ServerMessage::Error {
            code: "BAD_CHANNEL".into(),
            message: format!("unknown channel: {}", name),
        });
    };

    // User-scoped channels require the authenticated identity to match
    if let Some(required) = channel.required_user() {
        if required != user {
            return Err(ServerMessage::Error {
                code: "UNAUTHORIZED".into(),
                message: "channel belongs to another user".into(),
            });
        }
    }

    let (snapshot_seq, receiver) = match &channel {
        Channel::Book { symbol } => {
            let Some((snapshot, receiver)) = state.bus.subscribe_book(symbol) else {
                return Err(ServerMessage::Error {
                    code: "INVALID_SYMBOL".into(),
                    message: format!("unknown symbol: {}", symbol),
                });
            };
            // Snapshot first; the forwarder then drops frames at or below
            // its sequence
            let frame = EventFrame {
                channel: name.to_string(),
                seq: snapshot.seq,
                ts_ns: now_ns(),
                payload: snapshot.payload(),
            };
            send_frame(out_tx, &frame).await;
            (snapshot.seq, receiver)
        }
        Channel::Trades { symbol } => {
            if !state.symbols.contains_key(symbol) {
                return Err(ServerMessage::Error {
                    code: "INVALID_SYMBOL".into(),
                    message: format!("unknown symbol: {}", symbol),
                });
            }
            (0, state.bus.subscribe(&channel))
        }
        _ => (0, state.bus.subscribe(&channel)),
    };

    let out = out_tx.clone();
    let channel_name = name.to_string();
    Ok(tokio::spawn(forward(receiver, out, snapshot_seq, channel_name)))
}

/// Pump frames from the bus to the socket until lag or disconnect.
async fn forward(
    mut receiver: broadcast::Receiver<Arc<EventFrame>>,
    out: mpsc::Sender<Message>,
    min_seq: u64,
    channel: String,
) {
    loop {
        match receiver.recv().await {
            Ok(frame) => {
                if frame.seq <= min_seq {
                    continue;
                }
                let text = serde_json::to_string(frame.as_ref()).expect("frame serializes");
                if out.send(Message::Text(Utf8Bytes::from(text))).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(channel, missed, "subscriber lagged, closing connection");
                let closed = ServerMessage::Closed {
                    reason: "lagged".into(),
                };
                if let Ok(text) = serde_json::to_string(&closed) {
                    let _ = out.send(Message::Text(Utf8Bytes::from(text))).await;
                }
                let _ = out
                    .send(Message::Close(Some(CloseFrame {
                        code: 1008,
                        reason: Utf8Bytes::from_static("lagged"),
                    })))
                    .await;
                break;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn send_control(out: &mpsc::Sender<Message>, message: ServerMessage) {
    if let Ok(text) = serde_json::to_string(&message) {
        let _ = out.send(Message::Text(Utf8Bytes::from(text))).await;
    }
}

async fn send_frame(out: &mpsc::Sender<Message>, frame: &EventFrame) {
    if let Ok(text) = serde_json::to_string(frame) {
        let _ = out.send(Message::Text(Utf8Bytes::from(text))).await;
    }
}
