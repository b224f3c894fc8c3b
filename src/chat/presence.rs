//! Server-side presence tracking.
//!
//! In-memory registry (DashMap) keyed by user id, mapping to the set of
//! that user's open connections. Online status is derived from set
//! non-emptiness — it is never stored as a separate flag, so the two
//! signals cannot drift. The entry is removed (not left empty) when the
//! last connection closes; the caller broadcasts the offline transition on
//! that removal.
//!
//! All mutation happens from connection actor tasks; the DashMap is the
//! single owner of cross-connection presence state. The registry is a
//! lossy cache of "who is connected right now" — a process restart
//! legitimately resets it to empty.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

use crate::db::models::Role;

/// Info tracked per user in the presence registry.
#[derive(Debug, Clone)]
pub struct PresenceEntry {
    pub display_name: String,
    pub role: Role,
    pub connections: Vec<Uuid>,
}

pub type PresenceRegistry = Arc<DashMap<String, PresenceEntry>>;

/// Create a new empty presence registry.
pub fn new_presence_registry() -> PresenceRegistry {
    Arc::new(DashMap::new())
}

/// Register a connection for a user. Returns true when this is the user's
/// first open connection — the online transition the caller broadcasts.
pub fn add_connection(
    registry: &PresenceRegistry,
    user_id: &str,
    display_name: &str,
    role: Role,
    connection_id: Uuid,
) -> bool {
    let mut entry = registry
        .entry(user_id.to_string())
        .or_insert_with(|| PresenceEntry {
            display_name: display_name.to_string(),
            role,
            connections: Vec::new(),
        });
    entry.connections.push(connection_id);
    entry.connections.len() == 1
}

/// Remove a connection. Returns true when the user's last connection
/// closed — the entry is deleted and the caller broadcasts offline.
pub fn remove_connection(
    registry: &PresenceRegistry,
    user_id: &str,
    connection_id: Uuid,
) -> bool {
    let went_offline = match registry.get_mut(user_id) {
        Some(mut entry) => {
            entry.connections.retain(|c| *c != connection_id);
            entry.connections.is_empty()
        }
        None => false,
    };

    if went_offline {
        registry.remove(user_id);
    }
    went_offline
}

/// One user in the online roster snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineUser {
    pub user_id: String,
    pub display_name: String,
    pub role: Role,
    pub connection_count: usize,
}

/// Snapshot of every user with at least one open connection.
pub fn online_snapshot(registry: &PresenceRegistry) -> Vec<OnlineUser> {
    registry
        .iter()
        .map(|entry| OnlineUser {
            user_id: entry.key().clone(),
            display_name: entry.value().display_name.clone(),
            role: entry.value().role,
            connection_count: entry.value().connections.len(),
        })
        .collect()
}
