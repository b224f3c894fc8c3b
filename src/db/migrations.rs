use rusqlite_migration::{Migrations, M};

/// Define all schema migrations.
/// Uses SQLite user_version pragma for tracking — no migration table needed.
pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        M::up(
            "-- Migration 1: users and enrollments

CREATE TABLE users (
    id TEXT PRIMARY KEY,
    display_name TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'STUDENT',
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE UNIQUE INDEX idx_users_display_name ON users(display_name);

CREATE TABLE enrollments (
    user_id TEXT NOT NULL,
    course_id TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    enrolled_at TEXT NOT NULL,
    PRIMARY KEY (user_id, course_id),
    FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE INDEX idx_enrollments_course ON enrollments(course_id);
",
        ),
        M::up(
            "-- Migration 2: private rooms and memberships

CREATE TABLE private_rooms (
    id TEXT PRIMARY KEY,
    slug TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    creator_id TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    FOREIGN KEY (creator_id) REFERENCES users(id)
);

CREATE TABLE private_room_members (
    room_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'MEMBER',
    is_active INTEGER NOT NULL DEFAULT 1,
    is_banned INTEGER NOT NULL DEFAULT 0,
    joined_at TEXT NOT NULL,
    PRIMARY KEY (room_id, user_id),
    FOREIGN KEY (room_id) REFERENCES private_rooms(id),
    FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE INDEX idx_room_members_user ON private_room_members(user_id);
",
        ),
        M::up(
            "-- Migration 3: messages
-- Exactly one target column is non-null per row; the CHECK makes the
-- mutually-exclusive-target invariant structural.

CREATE TABLE messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    author_id TEXT NOT NULL,
    content TEXT NOT NULL,
    kind TEXT NOT NULL DEFAULT 'plain',
    course_id TEXT,
    lesson_id TEXT,
    private_room_id TEXT,
    dm_room_id TEXT,
    channel_id TEXT,
    edited INTEGER NOT NULL DEFAULT 0,
    deleted INTEGER NOT NULL DEFAULT 0,
    timestamp INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    FOREIGN KEY (author_id) REFERENCES users(id),
    CHECK (
        (course_id IS NOT NULL) + (lesson_id IS NOT NULL) +
        (private_room_id IS NOT NULL) + (dm_room_id IS NOT NULL) = 1
    )
);

CREATE INDEX idx_messages_course ON messages(course_id, channel_id, id);
CREATE INDEX idx_messages_lesson ON messages(lesson_id, channel_id, id);
CREATE INDEX idx_messages_private ON messages(private_room_id, id);
CREATE INDEX idx_messages_dm ON messages(dm_room_id, id);
",
        ),
    ])
}
