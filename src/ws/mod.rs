pub mod actor;
pub mod broadcast;
pub mod handler;
pub mod protocol;

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::db::models::Role;

/// Type alias for the sender half of a WebSocket connection's channel.
/// Other parts of the system can clone this to push messages to a specific
/// client.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;

/// Connection registry: tracks all active WebSocket connections per user.
/// A user can have multiple concurrent connections (multiple devices/tabs).
pub type ConnectionRegistry = Arc<DashMap<String, Vec<ConnectionSender>>>;

/// Create a new empty connection registry.
pub fn new_connection_registry() -> ConnectionRegistry {
    Arc::new(DashMap::new())
}

/// A connection subscribed to a room, carrying the display attributes
/// needed for rosters and broadcasts.
#[derive(Clone)]
pub struct RoomSubscriber {
    pub connection_id: Uuid,
    pub user_id: String,
    pub display_name: String,
    pub role: Role,
    pub sender: ConnectionSender,
}

/// Room registry: canonical room name -> subscribed connections. The sole
/// broadcast address for room-scoped events.
pub type RoomRegistry = Arc<DashMap<String, Vec<RoomSubscriber>>>;

/// Create a new empty room registry.
pub fn new_room_registry() -> RoomRegistry {
    Arc::new(DashMap::new())
}

/// Subscribe a connection to a room.
pub fn subscribe(rooms: &RoomRegistry, room_name: &str, subscriber: RoomSubscriber) {
    rooms
        .entry(room_name.to_string())
        .or_default()
        .push(subscriber);
}

/// Remove a connection from a room, dropping the entry once empty.
pub fn unsubscribe(rooms: &RoomRegistry, room_name: &str, connection_id: Uuid) {
    let now_empty = match rooms.get_mut(room_name) {
        Some(mut subscribers) => {
            subscribers.retain(|s| s.connection_id != connection_id);
            subscribers.is_empty()
        }
        None => false,
    };

    if now_empty {
        rooms.remove(room_name);
    }
}

/// One user in a room roster.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterUser {
    pub user_id: String,
    pub display_name: String,
    pub role: Role,
}

/// Room roster snapshot, deduplicated by user id even when a user holds
/// several connections subscribed to the same room.
pub fn room_roster(rooms: &RoomRegistry, room_name: &str) -> Vec<RosterUser> {
    let mut seen = std::collections::HashSet::new();
    let mut roster = Vec::new();

    if let Some(subscribers) = rooms.get(room_name) {
        for sub in subscribers.iter() {
            if seen.insert(sub.user_id.clone()) {
                roster.push(RosterUser {
                    user_id: sub.user_id.clone(),
                    display_name: sub.display_name.clone(),
                    role: sub.role,
                });
            }
        }
    }
    roster
}
