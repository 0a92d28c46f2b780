//! v001 -- Initial schema creation.
//!
//! Creates the two core tables: `profile` (single current-user
//! record) and `outbox` (durable send queue).

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Profile: exactly one current-user record per device
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS profile (
    slot      INTEGER PRIMARY KEY CHECK (slot = 0),
    user_id   TEXT NOT NULL,
    user_name TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Outbox: durable send jobs, keyed by the message id they carry
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS outbox (
    message_id      TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    room_id         TEXT NOT NULL,
    sender_id       TEXT NOT NULL,
    sender_name     TEXT NOT NULL,
    content         TEXT NOT NULL,
    timestamp_ms    INTEGER NOT NULL,           -- target send time, epoch ms
    media_paths     TEXT NOT NULL,              -- JSON array of local paths
    media_types     TEXT NOT NULL,              -- JSON array of mime types
    attempts        INTEGER NOT NULL DEFAULT 0,
    next_attempt_ms INTEGER NOT NULL DEFAULT 0  -- backoff deadline, epoch ms
);

CREATE INDEX IF NOT EXISTS idx_outbox_next_attempt
    ON outbox(next_attempt_ms);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
