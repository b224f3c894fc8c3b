use crate::chat::access::CourseRoomPolicy;
use crate::chat::presence::PresenceRegistry;
use crate::chat::typing::TypingTracker;
use crate::db::DbPool;
use crate::ws::{ConnectionRegistry, RoomRegistry};

/// Shared application state passed to all handlers via axum State extractor.
///
/// The registries are the only long-lived mutable shared state. They are
/// owned by the session layer and are a lossy cache of "who is connected
/// right now" — the store stays the single source of truth for everything
/// durable, and a process restart legitimately resets them to empty.
#[derive(Clone)]
pub struct AppState {
    /// SQLite connection wrapped in Arc<Mutex>
    pub db: DbPool,
    /// JWT signing secret (256-bit random key)
    pub jwt_secret: Vec<u8>,
    /// Active WebSocket connections per user
    pub connections: ConnectionRegistry,
    /// Canonical room name -> subscribed connections
    pub rooms: RoomRegistry,
    /// In-memory presence: user id -> open connections
    pub presence: PresenceRegistry,
    /// Canonical room name -> users currently typing
    pub typing: TypingTracker,
    /// Admission policy for course rooms
    pub course_policy: CourseRoomPolicy,
    /// Number of messages replayed on room join
    pub history_limit: u32,
}
