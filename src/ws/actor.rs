//! Actor-per-connection lifecycle.
//!
//! Splits the WebSocket into reader and writer halves:
//! - Writer task: owns the sink, forwards messages from an mpsc channel
//! - Reader loop: processes inbound events strictly in arrival order and
//!   dispatches them through the protocol state machine
//!
//! The mpsc channel allows any part of the system to send messages to this
//! client by cloning the sender.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};
use uuid::Uuid;

use crate::chat::{presence, typing};
use crate::db::models::Role;
use crate::state::AppState;
use crate::ws::broadcast::{
    broadcast_to_all, broadcast_to_room_except, send_to_connection,
};
use crate::ws::protocol::{self, ClientEvent, ServerEvent, Session};
use crate::ws::{self, ConnectionSender};

/// Ping interval: server sends WebSocket ping every 30 seconds.
/// Prevents connection leaks from abrupt disconnects, and bounds how long
/// a partitioned connection can hold presence and typing state.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Pong timeout: if pong not received within 10 seconds after ping, close.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Identity attached to a connection after the auth handshake.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub display_name: String,
    pub role: Role,
}

/// Run the actor for an authenticated WebSocket connection.
pub async fn run_connection(socket: WebSocket, state: AppState, user: AuthenticatedUser) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();
    let connection_id = Uuid::now_v7();

    // Register this connection in the connection registry
    register_connection(&state, &user.user_id, tx.clone());

    // The first connection is the online transition — broadcast exactly
    // once, to everyone.
    if presence::add_connection(
        &state.presence,
        &user.user_id,
        &user.display_name,
        user.role,
        connection_id,
    ) {
        broadcast_to_all(
            &state.connections,
            &ServerEvent::UserStatusChanged {
                user_id: user.user_id.clone(),
                is_online: true,
            },
        );
    }

    tracing::info!(
        user_id = %user.user_id,
        connection_id = %connection_id,
        "WebSocket actor started"
    );

    // Spawn writer task: forwards mpsc messages to WebSocket sink
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    // Spawn ping task: sends periodic pings and monitors pong responses
    let ping_tx = tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(PING_INTERVAL);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            // Send ping
            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                // Writer task has died — connection is gone
                break;
            }

            // Wait for pong within timeout
            match timeout(PONG_TIMEOUT, pong_rx.recv()).await {
                Ok(Some(())) => {
                    // Pong received, continue
                }
                _ => {
                    // Pong timeout or channel closed — close connection
                    tracing::warn!("Pong timeout, closing connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    break;
                }
            }
        }
    });

    let mut session = Session {
        connection_id,
        user_id: user.user_id.clone(),
        display_name: user.display_name.clone(),
        role: user.role,
        tx: tx.clone(),
        current_room: None,
    };

    // Reader loop: process incoming WebSocket messages. Each event handler
    // catches its own failures; one bad event never drops the connection,
    // let alone anyone else's.
    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => {
                        if let Err(e) = protocol::dispatch(&state, &mut session, event).await {
                            tracing::warn!(
                                user_id = %session.user_id,
                                connection_id = %connection_id,
                                error = %e,
                                "Event handler failed"
                            );
                            send_to_connection(
                                &session.tx,
                                &ServerEvent::Error {
                                    message: e.to_string(),
                                },
                            );
                        }
                    }
                    Err(e) => {
                        tracing::debug!(
                            user_id = %session.user_id,
                            error = %e,
                            "Unparseable client event"
                        );
                        send_to_connection(
                            &session.tx,
                            &ServerEvent::Error {
                                message: "invalid event payload".to_string(),
                            },
                        );
                    }
                },
                Message::Pong(_) => {
                    // Pong received — notify the ping task
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    // Respond to client pings with pong
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Binary(_) => {
                    tracing::debug!(
                        user_id = %session.user_id,
                        "Received binary frame (expected JSON text)"
                    );
                }
                Message::Close(frame) => {
                    tracing::info!(
                        user_id = %session.user_id,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    user_id = %session.user_id,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                // Stream ended — client disconnected
                tracing::info!(user_id = %session.user_id, "WebSocket stream ended");
                break;
            }
        }
    }

    // Cleanup: abort writer and ping tasks
    writer_handle.abort();
    ping_handle.abort();

    disconnect_cleanup(&state, &mut session);

    tracing::info!(
        user_id = %user.user_id,
        connection_id = %connection_id,
        "WebSocket actor stopped"
    );
}

/// Disconnect cleanup, in order:
/// 1. typing flags in every room, with a stop broadcast per room
/// 2. room subscription (quietly — abrupt disconnect emits no room-level
///    user_left, only the global presence signal)
/// 3. connection registry entry
/// 4. presence, broadcasting offline exactly once when the last connection
///    closed
fn disconnect_cleanup(state: &AppState, session: &mut Session) {
    for room_name in typing::clear_user(&state.typing, &session.user_id) {
        broadcast_to_room_except(
            &state.rooms,
            &room_name,
            session.connection_id,
            &ServerEvent::UserTyping {
                user_id: session.user_id.clone(),
                display_name: session.display_name.clone(),
                is_typing: false,
            },
        );
    }

    if let Some(room) = session.current_room.take() {
        ws::unsubscribe(&state.rooms, &room.canonical_name(), session.connection_id);
    }

    unregister_connection(state, &session.user_id);

    if presence::remove_connection(&state.presence, &session.user_id, session.connection_id) {
        broadcast_to_all(
            &state.connections,
            &ServerEvent::UserStatusChanged {
                user_id: session.user_id.clone(),
                is_online: false,
            },
        );
    }
}

/// Writer task: receives messages from mpsc channel and forwards them to
/// the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            // WebSocket send failed — connection is broken
            break;
        }
    }
}

/// Register a connection sender in the connection registry.
fn register_connection(state: &AppState, user_id: &str, tx: ConnectionSender) {
    state
        .connections
        .entry(user_id.to_string())
        .or_default()
        .push(tx);

    let conn_count = state
        .connections
        .get(user_id)
        .map(|v| v.len())
        .unwrap_or(0);
    tracing::debug!(
        user_id = %user_id,
        connections = conn_count,
        "Connection registered"
    );
}

/// Remove closed connections from the registry for a user.
/// After the reader loop exits, the actor's tx clones are dropped, so the
/// registry entry's sender reports closed. We remove senders that are
/// closed and drop the user entry once empty.
fn unregister_connection(state: &AppState, user_id: &str) {
    let mut remove_user = false;

    if let Some(mut connections) = state.connections.get_mut(user_id) {
        connections.retain(|sender| !sender.is_closed());
        if connections.is_empty() {
            remove_user = true;
        }
    }

    if remove_user {
        state.connections.remove(user_id);
    }

    tracing::debug!(
        user_id = %user_id,
        "Connection unregistered"
    );
}
