//! v001 -- Initial schema: `rooms`, `messages`, `attachments`.
//!
//! Foreign keys are declared without `ON DELETE CASCADE`; every delete path
//! removes dependent rows explicitly inside its own transaction, so the
//! referential guarantees hold on engines without cascade support too.

use rusqlite::Connection;

const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Rooms
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS rooms (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE                -- case-sensitive
);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id         TEXT PRIMARY KEY NOT NULL,    -- client-generated short id
    room_id    INTEGER NOT NULL,             -- FK -> rooms(id)
    timestamp  INTEGER NOT NULL,             -- epoch milliseconds, client clock
    sender     TEXT NOT NULL,                -- display name
    content    TEXT,
    public_key TEXT,                         -- hex-encoded sender key
    signature  TEXT,                         -- hex-encoded detached signature
    state      TEXT,                         -- always SAVED once persisted

    FOREIGN KEY (room_id) REFERENCES rooms(id)
);

CREATE INDEX IF NOT EXISTS idx_messages_room_id   ON messages(room_id);
CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(timestamp);

-- ----------------------------------------------------------------
-- Attachments
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS attachments (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    message_id TEXT NOT NULL,                -- FK -> messages(id)
    name       TEXT NOT NULL,                -- original filename
    type       TEXT NOT NULL,                -- MIME type
    size       INTEGER NOT NULL,             -- decoded byte count
    data       BLOB,

    FOREIGN KEY (message_id) REFERENCES messages(id)
);

CREATE INDEX IF NOT EXISTS idx_attachments_message_id ON attachments(message_id);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
