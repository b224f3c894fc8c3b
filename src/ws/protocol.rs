//! Wire protocol and per-connection session state machine.
//!
//! One JSON object per text frame, `{"event": ..., "data": ...}`. Inbound
//! events are dispatched strictly in arrival order by the connection's
//! actor; store calls are the only suspension points. Every handler
//! surfaces its failure as a scoped `error` event to the originating
//! connection only — nothing here can take down another user's
//! connection.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::timeout;
use uuid::Uuid;

use crate::chat::history::{
    self, MessageKind, MessageTarget, StoredMessage, MAX_CONTENT_LENGTH,
};
use crate::chat::presence::OnlineUser;
use crate::chat::room::{RoomDescriptor, RoomKind};
use crate::chat::{access, presence, typing};
use crate::db::models::Role;
use crate::state::AppState;
use crate::ws::broadcast::{
    broadcast_to_room, broadcast_to_room_except, send_to_connection,
};
use crate::ws::{self, ConnectionSender, RoomSubscriber, RosterUser};

/// Bound on any single store access issued from the session layer. A hung
/// store call fails the one operation that issued it, never the server.
const STORE_CALL_TIMEOUT: Duration = Duration::from_secs(5);

// --- Inbound events (client -> server) ---

#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinRoom(RoomRef),
    LeaveRoom(RoomRef),
    SendMessage(SendMessagePayload),
    TypingStart(RoomRef),
    TypingStop(RoomRef),
    GetOnlineUsers,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRef {
    pub room_kind: RoomKind,
    pub room_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub room_kind: RoomKind,
    pub room_id: String,
    pub content: String,
    #[serde(default)]
    pub kind: MessageKind,
}

// --- Outbound events (server -> one or many clients) ---

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    RoomJoined {
        room_kind: RoomKind,
        room_id: String,
        canonical_name: String,
        channel_id: String,
    },
    #[serde(rename_all = "camelCase")]
    MessageHistory {
        channel_id: String,
        messages: Vec<StoredMessage>,
    },
    #[serde(rename_all = "camelCase")]
    RoomOnlineUsers { users: Vec<RosterUser> },
    NewMessage(MessagePayload),
    #[serde(rename_all = "camelCase")]
    UserJoined {
        user_id: String,
        display_name: String,
    },
    #[serde(rename_all = "camelCase")]
    UserLeft {
        user_id: String,
        display_name: String,
    },
    #[serde(rename_all = "camelCase")]
    UserTyping {
        user_id: String,
        display_name: String,
        is_typing: bool,
    },
    #[serde(rename_all = "camelCase")]
    UserStatusChanged {
        user_id: String,
        is_online: bool,
    },
    #[serde(rename_all = "camelCase")]
    OnlineUsers { users: Vec<OnlineUser> },
    Error { message: String },
}

/// Full message payload fanned out to a room, author display attributes
/// included.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub id: i64,
    pub room_kind: RoomKind,
    pub room_id: String,
    pub channel_id: Option<String>,
    pub author_id: String,
    pub author_display_name: String,
    pub author_role: Role,
    pub content: String,
    pub kind: MessageKind,
    pub timestamp: i64,
}

// --- Session state ---

/// Per-connection session state. Owned by the connection's actor task and
/// never shared. At most one subscribed room at a time — joining a new
/// room supersedes the previous one.
pub struct Session {
    pub connection_id: Uuid,
    pub user_id: String,
    pub display_name: String,
    pub role: Role,
    pub tx: ConnectionSender,
    pub current_room: Option<RoomDescriptor>,
}

impl Session {
    fn is_in(&self, canonical_name: &str) -> bool {
        self.current_room
            .as_ref()
            .is_some_and(|room| room.canonical_name() == canonical_name)
    }

    fn subscriber(&self) -> RoomSubscriber {
        RoomSubscriber {
            connection_id: self.connection_id,
            user_id: self.user_id.clone(),
            display_name: self.display_name.clone(),
            role: self.role,
            sender: self.tx.clone(),
        }
    }
}

/// Failures surfaced to the originating connection as scoped `error`
/// events. Store details are logged server-side, never sent to clients.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("access denied")]
    AccessDenied,
    #[error("you are not in that room")]
    NotInRoom,
    #[error("message content is empty")]
    EmptyContent,
    #[error("message is too long")]
    ContentTooLong,
    #[error("room not found")]
    RoomNotFound,
    #[error("internal error, please try again")]
    Store(Box<dyn std::error::Error + Send + Sync>),
    #[error("internal error, please try again")]
    StoreTimeout,
}

/// Await a store call under the session-layer timeout.
async fn with_store_timeout<T, F>(fut: F) -> Result<T, SessionError>
where
    F: std::future::Future<Output = history::StoreResult<T>>,
{
    match timeout(STORE_CALL_TIMEOUT, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(SessionError::Store(e)),
        Err(_) => Err(SessionError::StoreTimeout),
    }
}

/// Dispatch one inbound event. The caller (the connection actor) turns an
/// Err into a scoped `error` event for this connection only.
pub async fn dispatch(
    state: &AppState,
    session: &mut Session,
    event: ClientEvent,
) -> Result<(), SessionError> {
    match event {
        ClientEvent::JoinRoom(room) => handle_join(state, session, room).await,
        ClientEvent::LeaveRoom(room) => handle_leave(state, session, room),
        ClientEvent::SendMessage(msg) => handle_send(state, session, msg).await,
        ClientEvent::TypingStart(room) => handle_typing(state, session, room, true),
        ClientEvent::TypingStop(room) => handle_typing(state, session, room, false),
        ClientEvent::GetOnlineUsers => {
            send_to_connection(
                &session.tx,
                &ServerEvent::OnlineUsers {
                    users: presence::online_snapshot(&state.presence),
                },
            );
            Ok(())
        }
    }
}

/// Join a room: evaluate access, supersede any previous subscription, then
/// emit room_joined / message_history / room_online_users to the requester
/// and a user_joined notice to the rest of the room.
async fn handle_join(
    state: &AppState,
    session: &mut Session,
    room: RoomRef,
) -> Result<(), SessionError> {
    let descriptor = RoomDescriptor::parse(room.room_kind, &room.room_id);
    let canonical = descriptor.canonical_name();

    // Access first: a denied join must leave the prior subscription
    // untouched.
    let allowed = match timeout(
        STORE_CALL_TIMEOUT,
        access::can_access(
            &state.db,
            state.course_policy,
            &session.user_id,
            session.role,
            &descriptor,
        ),
    )
    .await
    {
        Ok(allowed) => allowed,
        Err(_) => {
            tracing::warn!(
                user_id = %session.user_id,
                room = %canonical,
                "Access check timed out, denying"
            );
            false
        }
    };
    if !allowed {
        return Err(SessionError::AccessDenied);
    }

    // Joining always supersedes: at most one room per connection. The old
    // room is left quietly (no user_left notice on supersede).
    if let Some(previous) = session.current_room.take() {
        leave_room(state, session, &previous, false);
    }

    ws::subscribe(&state.rooms, &canonical, session.subscriber());
    session.current_room = Some(descriptor.clone());

    send_to_connection(
        &session.tx,
        &ServerEvent::RoomJoined {
            room_kind: descriptor.kind,
            room_id: descriptor.room_id.clone(),
            canonical_name: canonical.clone(),
            channel_id: descriptor.channel_id.clone(),
        },
    );

    // The client may disconnect while the fetch is pending; the sends
    // below no-op on a closed channel.
    let messages =
        with_store_timeout(history::fetch_recent(&state.db, &descriptor, state.history_limit))
            .await?;
    send_to_connection(
        &session.tx,
        &ServerEvent::MessageHistory {
            channel_id: descriptor.channel_id.clone(),
            messages,
        },
    );

    send_to_connection(
        &session.tx,
        &ServerEvent::RoomOnlineUsers {
            users: ws::room_roster(&state.rooms, &canonical),
        },
    );

    broadcast_to_room_except(
        &state.rooms,
        &canonical,
        session.connection_id,
        &ServerEvent::UserJoined {
            user_id: session.user_id.clone(),
            display_name: session.display_name.clone(),
        },
    );

    tracing::info!(
        user_id = %session.user_id,
        room = %canonical,
        channel = %descriptor.channel_id,
        "Joined room"
    );
    Ok(())
}

/// Explicit leave: unsubscribe, notify the room, clear typing state.
fn handle_leave(
    state: &AppState,
    session: &mut Session,
    room: RoomRef,
) -> Result<(), SessionError> {
    let descriptor = RoomDescriptor::parse(room.room_kind, &room.room_id);
    let canonical = descriptor.canonical_name();

    let leaving = match session.current_room.take() {
        Some(current) if current.canonical_name() == canonical => current,
        other => {
            session.current_room = other;
            return Err(SessionError::NotInRoom);
        }
    };

    leave_room(state, session, &leaving, true);
    tracing::info!(user_id = %session.user_id, room = %canonical, "Left room");
    Ok(())
}

/// Shared teardown for explicit leave and supersede-on-join. `announce`
/// controls the room-level user_left notice.
fn leave_room(state: &AppState, session: &Session, room: &RoomDescriptor, announce: bool) {
    let canonical = room.canonical_name();
    ws::unsubscribe(&state.rooms, &canonical, session.connection_id);

    // Clear any typing flag left behind in the departed room.
    if typing::stop(&state.typing, &canonical, &session.user_id) {
        broadcast_to_room_except(
            &state.rooms,
            &canonical,
            session.connection_id,
            &ServerEvent::UserTyping {
                user_id: session.user_id.clone(),
                display_name: session.display_name.clone(),
                is_typing: false,
            },
        );
    }

    if announce {
        broadcast_to_room(
            &state.rooms,
            &canonical,
            &ServerEvent::UserLeft {
                user_id: session.user_id.clone(),
                display_name: session.display_name.clone(),
            },
        );
    }
}

/// Send a message into the currently subscribed room. Persists first, then
/// fans out to every subscriber INCLUDING the sender — the sender's UI
/// receives its own message through the same channel as everyone else,
/// which keeps ordering consistent across concurrent senders.
async fn handle_send(
    state: &AppState,
    session: &mut Session,
    msg: SendMessagePayload,
) -> Result<(), SessionError> {
    let descriptor = RoomDescriptor::parse(msg.room_kind, &msg.room_id);
    let canonical = descriptor.canonical_name();

    // A client cannot send into a room it has not joined.
    if !session.is_in(&canonical) {
        return Err(SessionError::NotInRoom);
    }

    let content = msg.content.trim().to_string();
    if content.is_empty() {
        return Err(SessionError::EmptyContent);
    }
    if content.len() > MAX_CONTENT_LENGTH {
        return Err(SessionError::ContentTooLong);
    }

    // Resolve the mutually-exclusive persistence target once, here.
    let (target, channel_id) = match descriptor.kind {
        RoomKind::Course => (
            MessageTarget::Course {
                course_id: descriptor.room_id.clone(),
            },
            Some(descriptor.channel_id.clone()),
        ),
        RoomKind::Lesson => (
            MessageTarget::Lesson {
                lesson_id: descriptor.room_id.clone(),
            },
            Some(descriptor.channel_id.clone()),
        ),
        RoomKind::Dm => (
            MessageTarget::Dm {
                room_id: descriptor.room_id.clone(),
            },
            None,
        ),
        RoomKind::Private => {
            let internal_id = with_store_timeout(history::resolve_private_room_id(
                &state.db,
                &descriptor.room_id,
            ))
            .await?
            .ok_or(SessionError::RoomNotFound)?;
            (MessageTarget::PrivateRoom { room_id: internal_id }, None)
        }
    };

    let stored = with_store_timeout(history::save_message(
        &state.db,
        &session.user_id,
        &content,
        msg.kind,
        target,
        channel_id,
    ))
    .await?;

    // Sending clears the sender's typing flag.
    if typing::stop(&state.typing, &canonical, &session.user_id) {
        broadcast_to_room_except(
            &state.rooms,
            &canonical,
            session.connection_id,
            &ServerEvent::UserTyping {
                user_id: session.user_id.clone(),
                display_name: session.display_name.clone(),
                is_typing: false,
            },
        );
    }

    broadcast_to_room(
        &state.rooms,
        &canonical,
        &ServerEvent::NewMessage(MessagePayload {
            id: stored.id,
            room_kind: descriptor.kind,
            room_id: descriptor.room_id.clone(),
            channel_id: stored.channel_id.clone(),
            author_id: stored.author_id.clone(),
            author_display_name: stored.author_display_name.clone(),
            author_role: session.role,
            content: stored.content.clone(),
            kind: stored.kind,
            timestamp: stored.timestamp,
        }),
    );

    tracing::debug!(
        user_id = %session.user_id,
        room = %canonical,
        message_id = stored.id,
        "Message persisted and broadcast"
    );
    Ok(())
}

/// Typing signals. Start marks and notifies; stop is idempotent and always
/// broadcasts so a late stop still clears remote indicators.
fn handle_typing(
    state: &AppState,
    session: &Session,
    room: RoomRef,
    is_typing: bool,
) -> Result<(), SessionError> {
    let descriptor = RoomDescriptor::parse(room.room_kind, &room.room_id);
    let canonical = descriptor.canonical_name();

    if !session.is_in(&canonical) {
        return Err(SessionError::NotInRoom);
    }

    if is_typing {
        typing::start(&state.typing, &canonical, &session.user_id);
    } else {
        typing::stop(&state.typing, &canonical, &session.user_id);
    }

    broadcast_to_room_except(
        &state.rooms,
        &canonical,
        session.connection_id,
        &ServerEvent::UserTyping {
            user_id: session.user_id.clone(),
            display_name: session.display_name.clone(),
            is_typing,
        },
    );
    Ok(())
}
