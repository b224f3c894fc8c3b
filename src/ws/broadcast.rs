//! Event fan-out helpers.
//!
//! Events are JSON text frames. A send that fails means the receiving
//! connection is already gone; its own disconnect path cleans up, so
//! failures here are ignored.

use axum::extract::ws::Message;
use uuid::Uuid;

use super::{ConnectionRegistry, ConnectionSender, RoomRegistry};
use crate::ws::protocol::ServerEvent;

fn encode(event: &ServerEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode server event");
            None
        }
    }
}

/// Send an event to a single connection.
pub fn send_to_connection(tx: &ConnectionSender, event: &ServerEvent) {
    if let Some(msg) = encode(event) {
        let _ = tx.send(msg);
    }
}

/// Broadcast an event to every connection of every user.
pub fn broadcast_to_all(registry: &ConnectionRegistry, event: &ServerEvent) {
    let Some(msg) = encode(event) else { return };

    for entry in registry.iter() {
        for sender in entry.value().iter() {
            let _ = sender.send(msg.clone());
        }
    }
}

/// Broadcast an event to every connection subscribed to a room, including
/// the sender's own.
pub fn broadcast_to_room(rooms: &RoomRegistry, room_name: &str, event: &ServerEvent) {
    let Some(msg) = encode(event) else { return };

    if let Some(subscribers) = rooms.get(room_name) {
        for sub in subscribers.iter() {
            let _ = sub.sender.send(msg.clone());
        }
    }
}

/// Broadcast an event to everyone subscribed to a room except one
/// connection (typically the originator).
pub fn broadcast_to_room_except(
    rooms: &RoomRegistry,
    room_name: &str,
    except: Uuid,
    event: &ServerEvent,
) {
    let Some(msg) = encode(event) else { return };

    if let Some(subscribers) = rooms.get(room_name) {
        for sub in subscribers.iter() {
            if sub.connection_id != except {
                let _ = sub.sender.send(msg.clone());
            }
        }
    }
}
