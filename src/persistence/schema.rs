//! `SQLite` schema bootstrap logic.
//!
//! All definitions use `IF NOT EXISTS` and are safe to re-run on every
//! server startup.

use sqlx::SqlitePool;

use crate::Result;

/// Apply all table and index definitions to the connected database.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS agent_role (
    id                   TEXT PRIMARY KEY NOT NULL,
    name                 TEXT NOT NULL UNIQUE,
    description          TEXT NOT NULL DEFAULT '',
    max_concurrent_chats INTEGER NOT NULL CHECK(max_concurrent_chats > 0),
    priority             INTEGER NOT NULL DEFAULT 0,
    created_at           TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS agent (
    id            TEXT PRIMARY KEY NOT NULL,
    role_id       TEXT NOT NULL REFERENCES agent_role(id),
    display_name  TEXT NOT NULL,
    email         TEXT,
    status        TEXT NOT NULL CHECK(status IN ('online','offline')),
    is_available  INTEGER NOT NULL DEFAULT 0,
    current_load  INTEGER NOT NULL DEFAULT 0 CHECK(current_load >= 0),
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS conversation (
    id                TEXT PRIMARY KEY NOT NULL,
    session_id        TEXT NOT NULL,
    status            TEXT NOT NULL CHECK(status IN ('waiting','assigned','active','closed','abandoned')),
    priority          TEXT NOT NULL CHECK(priority IN ('low','normal','high','urgent')),
    department        TEXT NOT NULL,
    assigned_agent_id TEXT REFERENCES agent(id),
    user_identifier   TEXT,
    user_name         TEXT,
    user_email        TEXT,
    metadata          TEXT NOT NULL DEFAULT '{}',
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL,
    assigned_at       TEXT,
    first_response_at TEXT,
    closed_at         TEXT,
    user_rating       INTEGER CHECK(user_rating BETWEEN 1 AND 5)
);

CREATE TABLE IF NOT EXISTS chat_message (
    seq             INTEGER PRIMARY KEY AUTOINCREMENT,
    id              TEXT NOT NULL UNIQUE,
    conversation_id TEXT NOT NULL REFERENCES conversation(id) ON DELETE CASCADE,
    sender_type     TEXT NOT NULL CHECK(sender_type IN ('user','agent','system')),
    content         TEXT NOT NULL,
    created_at      TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_conversation_open_session
    ON conversation(session_id) WHERE status IN ('waiting','assigned','active');
CREATE INDEX IF NOT EXISTS idx_conversation_status ON conversation(status);
CREATE INDEX IF NOT EXISTS idx_conversation_agent ON conversation(assigned_agent_id);
CREATE INDEX IF NOT EXISTS idx_conversation_created ON conversation(created_at);
CREATE INDEX IF NOT EXISTS idx_message_conversation ON chat_message(conversation_id, seq);
CREATE INDEX IF NOT EXISTS idx_agent_role ON agent(role_id);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
