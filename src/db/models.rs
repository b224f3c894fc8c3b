/// Closed role sets stored as TEXT in the schema defined in migrations.rs.
/// Unknown values in the store degrade to the least-privileged variant.
use serde::{Deserialize, Serialize};

/// Platform role carried by tokens and presence rosters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Instructor,
    Student,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Instructor => "INSTRUCTOR",
            Self::Student => "STUDENT",
        }
    }

    pub fn from_db(s: &str) -> Self {
        match s {
            "ADMIN" => Self::Admin,
            "INSTRUCTOR" => Self::Instructor,
            _ => Self::Student,
        }
    }

    /// Staff roles bypass course-room admission policies.
    pub fn is_staff(self) -> bool {
        matches!(self, Self::Admin | Self::Instructor)
    }
}

/// Membership role within a private room. The room creator has access
/// regardless of whether a membership row exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomRole {
    Owner,
    Moderator,
    Member,
}

impl RoomRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "OWNER",
            Self::Moderator => "MODERATOR",
            Self::Member => "MEMBER",
        }
    }

    pub fn from_db(s: &str) -> Self {
        match s {
            "OWNER" => Self::Owner,
            "MODERATOR" => Self::Moderator,
            _ => Self::Member,
        }
    }
}
