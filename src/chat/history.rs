//! Message persistence and history retrieval.
//!
//! The adapter persists messages with the correct foreign key and replays
//! recent history on room join. It does not infer the target from a room
//! kind — the session handler resolves the mutually-exclusive target once,
//! so that invariant lives in exactly one place.

use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::chat::room::{RoomDescriptor, RoomKind};
use crate::db::DbPool;

/// Maximum message content length (chars).
pub const MAX_CONTENT_LENGTH: usize = 4000;
/// Default number of messages replayed on room join.
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;
/// Upper bound for the configurable history limit.
pub const MAX_HISTORY_LIMIT: u32 = 100;

pub type StoreResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Message kind tag. `plain` unless the client says otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Plain,
    Question,
    Answer,
    Announcement,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Question => "question",
            Self::Answer => "answer",
            Self::Announcement => "announcement",
        }
    }

    pub fn from_db(s: &str) -> Self {
        match s {
            "question" => Self::Question,
            "answer" => Self::Answer,
            "announcement" => Self::Announcement,
            _ => Self::Plain,
        }
    }
}

/// Persistence target for one message. Exactly one foreign key, by
/// construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageTarget {
    Course { course_id: String },
    Lesson { lesson_id: String },
    /// Internal private-room id — slugs are resolved before this point.
    PrivateRoom { room_id: String },
    /// The canonical composite DM id is the room id; no further resolution.
    Dm { room_id: String },
}

/// A persisted message with the author display attributes joined in.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: i64,
    pub author_id: String,
    pub author_display_name: String,
    pub content: String,
    pub kind: MessageKind,
    pub channel_id: Option<String>,
    pub timestamp: i64,
    pub edited: bool,
}

/// Persist one message. The caller supplies the already-resolved target and
/// the channel tag (meaningful for course/lesson targets only).
pub async fn save_message(
    db: &DbPool,
    author_id: &str,
    content: &str,
    kind: MessageKind,
    target: MessageTarget,
    channel_id: Option<String>,
) -> StoreResult<StoredMessage> {
    let db = db.clone();
    let author = author_id.to_string();
    let body = content.to_string();

    tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|e| format!("DB lock error: {}", e))?;

        let (course_id, lesson_id, private_room_id, dm_room_id) = match &target {
            MessageTarget::Course { course_id } => (Some(course_id.clone()), None, None, None),
            MessageTarget::Lesson { lesson_id } => (None, Some(lesson_id.clone()), None, None),
            MessageTarget::PrivateRoom { room_id } => (None, None, Some(room_id.clone()), None),
            MessageTarget::Dm { room_id } => (None, None, None, Some(room_id.clone())),
        };

        let display_name: String = conn
            .query_row(
                "SELECT display_name FROM users WHERE id = ?1",
                rusqlite::params![author],
                |row| row.get(0),
            )
            .unwrap_or_else(|_| "Unknown".to_string());

        let timestamp = Utc::now().timestamp_millis();
        let created_at = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO messages (author_id, content, kind, course_id, lesson_id,
                                   private_room_id, dm_room_id, channel_id,
                                   edited, deleted, timestamp, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, 0, ?9, ?10)",
            rusqlite::params![
                author,
                body,
                kind.as_str(),
                course_id,
                lesson_id,
                private_room_id,
                dm_room_id,
                channel_id,
                timestamp,
                created_at,
            ],
        )
        .map_err(|e| format!("message insert: {}", e))?;

        let id = conn.last_insert_rowid();

        Ok::<_, String>(StoredMessage {
            id,
            author_id: author,
            author_display_name: display_name,
            content: body,
            kind,
            channel_id,
            timestamp,
            edited: false,
        })
    })
    .await
    .map_err(|e| format!("message save task: {}", e))?
    .map_err(Into::into)
}

/// Recent history for a room, oldest-first.
///
/// Queries newest-first limited to `limit`, then reverses — callers always
/// receive chronological display order. A private slug that resolves to no
/// room yields empty history rather than an error: joining a
/// not-yet-existent slugged room shows "no history".
pub async fn fetch_recent(
    db: &DbPool,
    room: &RoomDescriptor,
    limit: u32,
) -> StoreResult<Vec<StoredMessage>> {
    let db = db.clone();
    let room = room.clone();

    tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|e| format!("DB lock error: {}", e))?;

        let (filter, key): (&str, String) = match room.kind {
            RoomKind::Course => ("m.course_id = ?1 AND m.channel_id = ?2", room.room_id.clone()),
            RoomKind::Lesson => ("m.lesson_id = ?1 AND m.channel_id = ?2", room.room_id.clone()),
            RoomKind::Dm => ("m.dm_room_id = ?1", room.room_id.clone()),
            RoomKind::Private => {
                match resolve_private_room(&conn, &room.room_id)
                    .map_err(|e| format!("private room resolve: {}", e))?
                {
                    Some(internal_id) => ("m.private_room_id = ?1", internal_id),
                    None => return Ok(Vec::new()),
                }
            }
        };

        let sql = format!(
            "SELECT m.id, m.author_id, m.content, m.kind, m.channel_id,
                    m.timestamp, m.edited, u.display_name
             FROM messages m
             LEFT JOIN users u ON m.author_id = u.id
             WHERE {} AND m.deleted = 0
             ORDER BY m.id DESC
             LIMIT {}",
            filter,
            limit.min(MAX_HISTORY_LIMIT)
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| format!("history prepare: {}", e))?;

        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<StoredMessage> {
            let kind: String = row.get(3)?;
            let display_name: Option<String> = row.get(7)?;
            Ok(StoredMessage {
                id: row.get(0)?,
                author_id: row.get(1)?,
                content: row.get(2)?,
                kind: MessageKind::from_db(&kind),
                channel_id: row.get(4)?,
                timestamp: row.get(5)?,
                edited: row.get::<_, i64>(6)? != 0,
                author_display_name: display_name.unwrap_or_else(|| "Unknown".to_string()),
            })
        };

        let rows = if room.kind.has_channels() {
            stmt.query_map(rusqlite::params![key, room.channel_id], map_row)
        } else {
            stmt.query_map(rusqlite::params![key], map_row)
        }
        .map_err(|e| format!("history query: {}", e))?;

        let mut messages: Vec<StoredMessage> = rows.filter_map(|r| r.ok()).collect();
        // Newest-first from the index scan; callers want oldest-first.
        messages.reverse();

        Ok::<_, String>(messages)
    })
    .await
    .map_err(|e| format!("history fetch task: {}", e))?
    .map_err(Into::into)
}

/// Resolve a private room slug (or internal id) to the internal id used as
/// the message foreign key.
pub async fn resolve_private_room_id(
    db: &DbPool,
    slug_or_id: &str,
) -> StoreResult<Option<String>> {
    let db = db.clone();
    let key = slug_or_id.to_string();

    tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|e| format!("DB lock error: {}", e))?;
        resolve_private_room(&conn, &key).map_err(|e| format!("private room resolve: {}", e))
    })
    .await
    .map_err(|e| format!("private room resolve task: {}", e))?
    .map_err(Into::into)
}

fn resolve_private_room(
    conn: &Connection,
    slug_or_id: &str,
) -> Result<Option<String>, rusqlite::Error> {
    use rusqlite::OptionalExtension;

    conn.query_row(
        "SELECT id FROM private_rooms WHERE (slug = ?1 OR id = ?1) AND is_active = 1",
        rusqlite::params![slug_or_id],
        |row| row.get(0),
    )
    .optional()
}
