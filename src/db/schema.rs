//! Database schema and migrations for Parley.
//!
//! This module contains all database migrations that will be applied
//! sequentially when the database is first opened or upgraded.

/// Database migrations.
///
/// Each migration is a SQL script that will be executed in order.
/// The schema_version table tracks which migrations have been applied.
pub const MIGRATIONS: &[&str] = &[
    // v1: Users table. Ids are issued externally, so TEXT primary keys.
    r#"
CREATE TABLE users (
    id             TEXT PRIMARY KEY,
    display_name   TEXT NOT NULL,
    trust_score    REAL NOT NULL DEFAULT 50.0,
    message_count  INTEGER NOT NULL DEFAULT 0,
    created_at     TEXT NOT NULL DEFAULT (datetime('now'))
);
"#,
    // v2: Rooms table.
    r#"
CREATE TABLE rooms (
    id                TEXT PRIMARY KEY,
    name              TEXT NOT NULL,
    max_participants  INTEGER NOT NULL DEFAULT 50,
    created_at        TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX idx_rooms_name ON rooms(name);
"#,
    // v3: Room memberships, one row per (user, room) pair.
    r#"
CREATE TABLE room_members (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    room_id     TEXT NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
    is_active   INTEGER NOT NULL DEFAULT 1,
    last_seen   TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(user_id, room_id)
);

CREATE INDEX idx_room_members_room_id ON room_members(room_id);
CREATE INDEX idx_room_members_user_id ON room_members(user_id);
"#,
    // v4: Messages table. RFC 3339 timestamps, same convention as the
    // rest of the schema.
    r#"
CREATE TABLE messages (
    id           TEXT PRIMARY KEY,
    room_id      TEXT NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
    user_id      TEXT NOT NULL REFERENCES users(id),
    sender_name  TEXT NOT NULL,
    content      TEXT NOT NULL,
    kind         TEXT NOT NULL DEFAULT 'text',
    created_at   TEXT NOT NULL
);

CREATE INDEX idx_messages_room_id ON messages(room_id);
CREATE INDEX idx_messages_created_at ON messages(created_at);
"#,
];
