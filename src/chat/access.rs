//! Room access control.
//!
//! One evaluator arm per room kind. Side-effect-free apart from reading the
//! store; any store failure while evaluating DENIES (fail closed) and is
//! logged with enough context to reproduce.

use crate::chat::room::{RoomDescriptor, RoomKind};
use crate::db::models::Role;
use crate::db::DbPool;

/// Admission policy for course rooms. The reference platform gates course
/// content at the lesson-release layer only, so `Open` is the default;
/// `Enrolled` additionally requires an active enrollment row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CourseRoomPolicy {
    #[default]
    Open,
    Enrolled,
}

impl CourseRoomPolicy {
    /// Parse the config string, falling back to `Open` with a warning.
    pub fn from_config(s: &str) -> Self {
        match s {
            "open" => Self::Open,
            "enrolled" => Self::Enrolled,
            other => {
                tracing::warn!(
                    policy = other,
                    "Unknown course_room_policy, falling back to open"
                );
                Self::Open
            }
        }
    }
}

/// Decide whether a user may join a room.
///
/// - `dm`: any authenticated identity is admitted.
/// - `lesson`: any authenticated identity is admitted — lesson gating lives
///   in the platform's content-release layer, not at the socket layer.
/// - `course`: staff always admitted; everyone else per the configured
///   policy.
/// - `private`: the room must exist and the requester must be its creator
///   or hold an active, non-banned membership.
pub async fn can_access(
    db: &DbPool,
    policy: CourseRoomPolicy,
    user_id: &str,
    role: Role,
    room: &RoomDescriptor,
) -> bool {
    match room.kind {
        RoomKind::Dm => true,
        RoomKind::Lesson => true,
        RoomKind::Course => {
            if role.is_staff() {
                return true;
            }
            match policy {
                CourseRoomPolicy::Open => true,
                CourseRoomPolicy::Enrolled => {
                    check_enrollment(db, user_id, &room.room_id).await
                }
            }
        }
        RoomKind::Private => check_private_membership(db, user_id, &room.room_id).await,
    }
}

/// Active enrollment check for the `enrolled` course policy.
async fn check_enrollment(db: &DbPool, user_id: &str, course_id: &str) -> bool {
    let db = db.clone();
    let user = user_id.to_string();
    let course = course_id.to_string();

    let result = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|e| format!("DB lock error: {}", e))?;
        let enrolled: bool = conn
            .query_row(
                "SELECT COUNT(*) FROM enrollments
                 WHERE user_id = ?1 AND course_id = ?2 AND is_active = 1",
                rusqlite::params![user, course],
                |row| row.get::<_, i64>(0).map(|c| c > 0),
            )
            .map_err(|e| format!("enrollment query: {}", e))?;
        Ok::<_, String>(enrolled)
    })
    .await;

    match result {
        Ok(Ok(enrolled)) => enrolled,
        Ok(Err(e)) => {
            tracing::warn!(
                user_id = %user_id,
                course_id = %course_id,
                error = %e,
                "Enrollment check failed, denying access"
            );
            false
        }
        Err(e) => {
            tracing::warn!(
                user_id = %user_id,
                course_id = %course_id,
                error = %e,
                "Enrollment check task failed, denying access"
            );
            false
        }
    }
}

/// Private room membership check. The slug (or internal id) must resolve to
/// an active room; the creator is admitted regardless of membership-row
/// presence; anyone else needs an active, non-banned membership.
async fn check_private_membership(db: &DbPool, user_id: &str, slug_or_id: &str) -> bool {
    let db = db.clone();
    let user = user_id.to_string();
    let key = slug_or_id.to_string();

    let result = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|e| format!("DB lock error: {}", e))?;

        let room: Option<(String, String)> = conn
            .query_row(
                "SELECT id, creator_id FROM private_rooms
                 WHERE (slug = ?1 OR id = ?1) AND is_active = 1",
                rusqlite::params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .ok();

        let (room_id, creator_id) = match room {
            Some(pair) => pair,
            // Only private rooms require existence; an unknown room denies.
            None => return Ok::<_, String>(false),
        };

        if creator_id == user {
            return Ok(true);
        }

        let member: bool = conn
            .query_row(
                "SELECT COUNT(*) FROM private_room_members
                 WHERE room_id = ?1 AND user_id = ?2
                   AND is_active = 1 AND is_banned = 0",
                rusqlite::params![room_id, user],
                |row| row.get::<_, i64>(0).map(|c| c > 0),
            )
            .map_err(|e| format!("membership query: {}", e))?;

        Ok(member)
    })
    .await;

    match result {
        Ok(Ok(allowed)) => allowed,
        Ok(Err(e)) => {
            tracing::warn!(
                user_id = %user_id,
                room = %slug_or_id,
                error = %e,
                "Private room access check failed, denying access"
            );
            false
        }
        Err(e) => {
            tracing::warn!(
                user_id = %user_id,
                room = %slug_or_id,
                error = %e,
                "Private room access task failed, denying access"
            );
            false
        }
    }
}
