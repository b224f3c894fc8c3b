//! Typing indicator tracking.
//!
//! Maps canonical room name -> set of user ids currently flagged as
//! typing. Entries leave the map on explicit stop, on message send, and on
//! disconnect cleanup. There is no timer here: the transport keepalive in
//! the connection actor bounds how long a partitioned connection can leave
//! a stale flag before the disconnect path clears it.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;

pub type TypingTracker = Arc<DashMap<String, HashSet<String>>>;

/// Create a new empty typing tracker.
pub fn new_typing_tracker() -> TypingTracker {
    Arc::new(DashMap::new())
}

/// Mark a user as typing in a room. Returns true if the flag was newly set.
pub fn start(tracker: &TypingTracker, room_name: &str, user_id: &str) -> bool {
    tracker
        .entry(room_name.to_string())
        .or_default()
        .insert(user_id.to_string())
}

/// Unmark a user. Idempotent — stopping an unset flag is a no-op here and
/// the caller still broadcasts the stop. Returns whether the flag was set.
pub fn stop(tracker: &TypingTracker, room_name: &str, user_id: &str) -> bool {
    let (was_typing, now_empty) = match tracker.get_mut(room_name) {
        Some(mut users) => {
            let removed = users.remove(user_id);
            (removed, users.is_empty())
        }
        None => (false, false),
    };

    if now_empty {
        tracker.remove(room_name);
    }
    was_typing
}

/// Clear a disconnecting user from every room it was typing in. Returns the
/// affected room names so the caller can broadcast a stop per room — no
/// dangling "is typing" indicator survives a dropped connection.
pub fn clear_user(tracker: &TypingTracker, user_id: &str) -> Vec<String> {
    let rooms: Vec<String> = tracker
        .iter()
        .filter(|entry| entry.value().contains(user_id))
        .map(|entry| entry.key().clone())
        .collect();

    for room_name in &rooms {
        stop(tracker, room_name, user_id);
    }
    rooms
}
