//! Room identity and addressing.
//!
//! Every logical chat room is addressed by a single canonical string key of
//! the form `{kind}_{roomId}`. The canonical name is the sole
//! subscription/broadcast address: two descriptors produce the same name
//! iff they address the same logical room.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Separator used in canonical names, DM composite ids, and channel
/// suffixes.
pub const ROOM_SEPARATOR: char = '_';

/// Channel used when a course/lesson room id carries no channel suffix.
pub const DEFAULT_CHANNEL: &str = "general";

/// The closed set of room kinds. Access rules and message targets are
/// matched per variant — kind strings never travel through the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    Lesson,
    Course,
    Dm,
    Private,
}

impl RoomKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lesson => "lesson",
            Self::Course => "course",
            Self::Dm => "dm",
            Self::Private => "private",
        }
    }

    /// Channels sub-partition history for course and lesson rooms only.
    pub fn has_channels(self) -> bool {
        matches!(self, Self::Lesson | Self::Course)
    }
}

impl fmt::Display for RoomKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed room address. Derived from client input, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomDescriptor {
    pub kind: RoomKind,
    /// Base room id with any channel suffix already stripped.
    pub room_id: String,
    pub channel_id: String,
}

impl RoomDescriptor {
    /// Parse a client-supplied room id into a descriptor.
    ///
    /// Course and lesson ids may carry a channel suffix after the LAST
    /// separator: `fx-101_qa` addresses room `fx-101`, channel `qa`, while a
    /// bare `fx-101` addresses channel `general`. An id that contains `_`
    /// for any other reason is still interpreted as carrying a channel
    /// suffix — that is the addressing convention, not a parse failure.
    /// DM and private ids are taken verbatim (a DM composite id contains the
    /// separator by construction and must not be split).
    pub fn parse(kind: RoomKind, raw_id: &str) -> Self {
        if kind.has_channels() {
            let (room_id, channel_id) = split_channel_suffix(raw_id);
            Self {
                kind,
                room_id,
                channel_id,
            }
        } else {
            Self {
                kind,
                room_id: raw_id.to_string(),
                channel_id: DEFAULT_CHANNEL.to_string(),
            }
        }
    }

    /// The canonical room name, prefix-tagged by kind so equal ids of
    /// different kinds never collide.
    pub fn canonical_name(&self) -> String {
        format!("{}{}{}", self.kind.as_str(), ROOM_SEPARATOR, self.room_id)
    }
}

/// Split a composite `base_channel` id on the last separator. Ids without a
/// separator (or with an empty half) address the default channel.
pub fn split_channel_suffix(raw: &str) -> (String, String) {
    match raw.rsplit_once(ROOM_SEPARATOR) {
        Some((base, channel)) if !base.is_empty() && !channel.is_empty() => {
            (base.to_string(), channel.to_string())
        }
        _ => (raw.to_string(), DEFAULT_CHANNEL.to_string()),
    }
}

/// Canonical DM room id for a pair of users: both ids sorted
/// lexicographically and joined. Pure and symmetric, so any two callers
/// computing it for the same pair agree regardless of who initiates.
pub fn resolve_dm_room_id(user_a: &str, user_b: &str) -> String {
    let (first, second) = if user_a <= user_b {
        (user_a, user_b)
    } else {
        (user_b, user_a)
    };
    format!("{first}{ROOM_SEPARATOR}{second}")
}
