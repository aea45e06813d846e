//! Message repository for `SQLite` persistence.
//!
//! Messages are append-only. Order within a conversation is the insertion
//! sequence; the guarded append clamps `created_at` to the conversation's
//! latest message so timestamps never run backwards in that order.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::models::conversation::ConversationStatus;
use crate::models::message::{Message, SenderType};
use crate::{AppError, Result};

use super::db::Database;
use super::{fmt_ts, parse_ts};

/// Repository for chat message records.
#[derive(Clone)]
pub struct MessageRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    conversation_id: String,
    sender_type: String,
    content: String,
    created_at: String,
}

impl MessageRow {
    fn into_message(self) -> Result<Message> {
        Ok(Message {
            sender_type: self
                .sender_type
                .parse::<SenderType>()
                .map_err(|e| AppError::Db(e.to_string()))?,
            created_at: parse_ts("created_at", &self.created_at)?,
            id: self.id,
            conversation_id: self.conversation_id,
            content: self.content,
        })
    }
}

impl MessageRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append `message` only if its conversation is currently in one of
    /// `allowed`.
    ///
    /// The status check and the insert are one statement, so a concurrent
    /// close cannot slip in between them. The stored `created_at` is the
    /// later of `message.created_at` and the conversation's newest message,
    /// decided while the write lock is held. Returns the stored timestamp,
    /// or `None` if nothing was written.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn append_if_status_in(
        conn: &mut SqliteConnection,
        message: &Message,
        allowed: &[ConversationStatus],
    ) -> Result<Option<DateTime<Utc>>> {
        if allowed.is_empty() {
            return Ok(None);
        }
        let allowed = allowed
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect::<Vec<_>>()
            .join(",");
        let query = format!(
            "INSERT INTO chat_message (id, conversation_id, sender_type, content, created_at)
             SELECT ?1, c.id, ?2, ?3,
                    MAX(?4, COALESCE((SELECT MAX(m.created_at) FROM chat_message m
                                      WHERE m.conversation_id = c.id), ?4))
             FROM conversation c
             WHERE c.id = ?5 AND c.status IN ({allowed})
             RETURNING created_at"
        );

        let row: Option<(String,)> = sqlx::query_as(&query)
            .bind(&message.id)
            .bind(message.sender_type.as_str())
            .bind(&message.content)
            .bind(fmt_ts(message.created_at))
            .bind(&message.conversation_id)
            .fetch_optional(&mut *conn)
            .await?;
        row.map(|(at,)| parse_ts("created_at", &at)).transpose()
    }

    /// Append `message` unconditionally.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn append_in(conn: &mut SqliteConnection, message: &Message) -> Result<()> {
        sqlx::query(
            "INSERT INTO chat_message (id, conversation_id, sender_type, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&message.id)
        .bind(&message.conversation_id)
        .bind(message.sender_type.as_str())
        .bind(&message.content)
        .bind(fmt_ts(message.created_at))
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// List a conversation's messages in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_for_conversation(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT id, conversation_id, sender_type, content, created_at
             FROM chat_message WHERE conversation_id = ?1 ORDER BY seq ASC",
        )
        .bind(conversation_id)
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(MessageRow::into_message).collect()
    }
}
