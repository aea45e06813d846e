//! Conversation repository for `SQLite` persistence.
//!
//! State-changing statements are guarded in their `WHERE` clause by the
//! statuses [`ConversationStatus::can_transition_to`] allows as a source,
//! and report whether they applied. Callers inside a
//! transaction use the `*_in` variants so the transition and the matching
//! agent load change commit together.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::models::conversation::{Contact, Conversation, ConversationStatus, Priority};
use crate::{AppError, Result};

use super::db::Database;
use super::{fmt_ts, parse_opt_ts, parse_ts};

/// Repository wrapper around `SQLite` for conversation records.
#[derive(Clone)]
pub struct ConversationRepo {
    db: Arc<Database>,
}

const SELECT_COLUMNS: &str = "SELECT id, session_id, status, priority, department, assigned_agent_id,
        user_identifier, user_name, user_email, metadata, created_at, updated_at,
        assigned_at, first_response_at, closed_at, user_rating
 FROM conversation";

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct ConversationRow {
    id: String,
    session_id: String,
    status: String,
    priority: String,
    department: String,
    assigned_agent_id: Option<String>,
    user_identifier: Option<String>,
    user_name: Option<String>,
    user_email: Option<String>,
    metadata: String,
    created_at: String,
    updated_at: String,
    assigned_at: Option<String>,
    first_response_at: Option<String>,
    closed_at: Option<String>,
    user_rating: Option<i64>,
}

impl ConversationRow {
    fn into_conversation(self) -> Result<Conversation> {
        let status = self
            .status
            .parse::<ConversationStatus>()
            .map_err(|e| AppError::Db(e.to_string()))?;
        let priority = self
            .priority
            .parse::<Priority>()
            .map_err(|e| AppError::Db(e.to_string()))?;
        let metadata = serde_json::from_str(&self.metadata)
            .map_err(|e| AppError::Db(format!("invalid metadata: {e}")))?;
        let user_rating = self
            .user_rating
            .map(u8::try_from)
            .transpose()
            .map_err(|e| AppError::Db(format!("invalid user_rating: {e}")))?;

        Ok(Conversation {
            status,
            priority,
            metadata,
            user_rating,
            created_at: parse_ts("created_at", &self.created_at)?,
            updated_at: parse_ts("updated_at", &self.updated_at)?,
            assigned_at: parse_opt_ts("assigned_at", self.assigned_at.as_deref())?,
            first_response_at: parse_opt_ts(
                "first_response_at",
                self.first_response_at.as_deref(),
            )?,
            closed_at: parse_opt_ts("closed_at", self.closed_at.as_deref())?,
            id: self.id,
            session_id: self.session_id,
            department: self.department,
            assigned_agent_id: self.assigned_agent_id,
            contact: Contact {
                user_identifier: self.user_identifier,
                user_name: self.user_name,
                user_email: self.user_email,
            },
        })
    }
}

/// Render a status set as an SQL `IN` list.
///
/// Values come from [`ConversationStatus::as_str`], never from callers.
fn status_list(statuses: &[ConversationStatus]) -> String {
    statuses
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(",")
}

/// `IN` list of the statuses allowed to move into `next`.
fn entry_list(next: ConversationStatus) -> String {
    status_list(&ConversationStatus::sources(next))
}

fn to_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

impl ConversationRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a fully formed conversation on the pool, outside any lifecycle
    /// transaction. Used to seed fixtures and imported history; the
    /// lifecycle inserts through [`Self::create_in`].
    ///
    /// # Errors
    ///
    /// See [`Self::create_in`].
    pub async fn create(&self, conversation: &Conversation) -> Result<Conversation> {
        let mut conn = self.db.acquire().await?;
        Self::create_in(&mut conn, conversation).await?;
        Ok(conversation.clone())
    }

    /// Insert a conversation on `conn`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Conflict` if the session already has a non-terminal
    /// conversation, or `AppError::Db` if the insert fails.
    pub async fn create_in(conn: &mut SqliteConnection, conversation: &Conversation) -> Result<()> {
        let metadata = serde_json::to_string(&conversation.metadata)?;

        let result = sqlx::query(
            "INSERT INTO conversation (id, session_id, status, priority, department,
             assigned_agent_id, user_identifier, user_name, user_email, metadata,
             created_at, updated_at, assigned_at, first_response_at, closed_at, user_rating)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        )
        .bind(&conversation.id)
        .bind(&conversation.session_id)
        .bind(conversation.status.as_str())
        .bind(conversation.priority.as_str())
        .bind(&conversation.department)
        .bind(&conversation.assigned_agent_id)
        .bind(&conversation.contact.user_identifier)
        .bind(&conversation.contact.user_name)
        .bind(&conversation.contact.user_email)
        .bind(&metadata)
        .bind(fmt_ts(conversation.created_at))
        .bind(fmt_ts(conversation.updated_at))
        .bind(conversation.assigned_at.map(fmt_ts))
        .bind(conversation.first_response_at.map(fmt_ts))
        .bind(conversation.closed_at.map(fmt_ts))
        .bind(conversation.user_rating.map(i64::from))
        .execute(&mut *conn)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(AppError::Conflict(format!(
                    "session {} already has an open conversation",
                    conversation.session_id
                )))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Retrieve a conversation by identifier.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the conversation does not exist.
    pub async fn get_by_id(&self, id: &str) -> Result<Conversation> {
        let mut conn = self.db.acquire().await?;
        Self::get_in(&mut conn, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("conversation {id} not found")))
    }

    /// Retrieve a conversation by identifier on `conn`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_in(conn: &mut SqliteConnection, id: &str) -> Result<Option<Conversation>> {
        let query = format!("{SELECT_COLUMNS} WHERE id = ?1");
        let row: Option<ConversationRow> = sqlx::query_as(&query)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        row.map(ConversationRow::into_conversation).transpose()
    }

    /// Find the non-terminal conversation for a session, if any.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_open_by_session(&self, session_id: &str) -> Result<Option<Conversation>> {
        let query = format!(
            "{SELECT_COLUMNS} WHERE session_id = ?1 AND status IN ({})",
            status_list(&ConversationStatus::OPEN)
        );
        let row: Option<ConversationRow> = sqlx::query_as(&query)
            .bind(session_id)
            .fetch_optional(self.db.as_ref())
            .await?;
        row.map(ConversationRow::into_conversation).transpose()
    }

    /// List conversations in any of `statuses`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_by_status(&self, statuses: &[ConversationStatus]) -> Result<Vec<Conversation>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let query = format!(
            "{SELECT_COLUMNS} WHERE status IN ({}) ORDER BY created_at ASC, id ASC",
            status_list(statuses)
        );
        let rows: Vec<ConversationRow> = sqlx::query_as(&query).fetch_all(self.db.as_ref()).await?;
        rows.into_iter()
            .map(ConversationRow::into_conversation)
            .collect()
    }

    /// List waiting conversations whose last activity is older than `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_idle_waiting(&self, cutoff: DateTime<Utc>) -> Result<Vec<Conversation>> {
        let query = format!(
            "{SELECT_COLUMNS} WHERE status = 'waiting' AND updated_at < ?1 ORDER BY created_at ASC"
        );
        let rows: Vec<ConversationRow> = sqlx::query_as(&query)
            .bind(fmt_ts(cutoff))
            .fetch_all(self.db.as_ref())
            .await?;
        rows.into_iter()
            .map(ConversationRow::into_conversation)
            .collect()
    }

    /// List conversations an agent holds in `statuses`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_for_agent(
        &self,
        agent_id: &str,
        statuses: &[ConversationStatus],
    ) -> Result<Vec<Conversation>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let query = format!(
            "{SELECT_COLUMNS} WHERE assigned_agent_id = ?1 AND status IN ({})
             ORDER BY created_at ASC",
            status_list(statuses)
        );
        let rows: Vec<ConversationRow> = sqlx::query_as(&query)
            .bind(agent_id)
            .fetch_all(self.db.as_ref())
            .await?;
        rows.into_iter()
            .map(ConversationRow::into_conversation)
            .collect()
    }

    /// `waiting → assigned` on `conn`. Returns whether the row changed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn mark_assigned_in(
        conn: &mut SqliteConnection,
        id: &str,
        agent_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let at = fmt_ts(at);
        let query = format!(
            "UPDATE conversation
             SET status = 'assigned', assigned_agent_id = ?1, assigned_at = ?2, updated_at = ?2
             WHERE id = ?3 AND status IN ({})",
            entry_list(ConversationStatus::Assigned)
        );
        let result = sqlx::query(&query)
            .bind(agent_id)
            .bind(&at)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// `assigned → active` with the first response time. Returns whether the row changed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn mark_active_in(
        conn: &mut SqliteConnection,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let at = fmt_ts(at);
        let query = format!(
            "UPDATE conversation
             SET status = 'active', first_response_at = ?1, updated_at = ?1
             WHERE id = ?2 AND status IN ({})",
            entry_list(ConversationStatus::Active)
        );
        let result = sqlx::query(&query)
            .bind(&at)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Bump the last-activity timestamp.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn touch_in(conn: &mut SqliteConnection, id: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE conversation SET updated_at = ?1 WHERE id = ?2")
            .bind(fmt_ts(at))
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// `assigned|active → closed`.
    ///
    /// Returns the agent whose load unit must be released, or `None` if the
    /// conversation was not in a closable state.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn mark_closed_in(
        conn: &mut SqliteConnection,
        id: &str,
        rating: Option<u8>,
        at: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let at = fmt_ts(at);
        let query = format!(
            "UPDATE conversation
             SET status = 'closed', closed_at = ?1, updated_at = ?1,
                 user_rating = COALESCE(?2, user_rating)
             WHERE id = ?3 AND status IN ({})
             RETURNING assigned_agent_id",
            entry_list(ConversationStatus::Closed)
        );
        let row: Option<(Option<String>,)> = sqlx::query_as(&query)
            .bind(&at)
            .bind(rating.map(i64::from))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        match row {
            Some((Some(agent_id),)) => Ok(Some(agent_id)),
            Some((None,)) => Err(AppError::Db(format!(
                "conversation {id} was held without an agent"
            ))),
            None => Ok(None),
        }
    }

    /// `waiting → abandoned`. Returns whether the row changed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn mark_abandoned_in(
        conn: &mut SqliteConnection,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let at = fmt_ts(at);
        let query = format!(
            "UPDATE conversation SET status = 'abandoned', closed_at = ?1, updated_at = ?1
             WHERE id = ?2 AND status IN ({})",
            entry_list(ConversationStatus::Abandoned)
        );
        let result = sqlx::query(&query)
            .bind(&at)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// `assigned → waiting` for the given owner. Returns whether the row changed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn mark_requeued_in(
        conn: &mut SqliteConnection,
        id: &str,
        agent_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let query = format!(
            "UPDATE conversation
             SET status = 'waiting', assigned_agent_id = NULL, assigned_at = NULL, updated_at = ?1
             WHERE id = ?2 AND status IN ({}) AND assigned_agent_id = ?3",
            entry_list(ConversationStatus::Waiting)
        );
        let result = sqlx::query(&query)
            .bind(fmt_ts(at))
            .bind(id)
            .bind(agent_id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Store the single post-close rating. Returns whether the row changed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn set_rating_in(conn: &mut SqliteConnection, id: &str, rating: u8) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE conversation SET user_rating = ?1
             WHERE id = ?2 AND status = 'closed' AND user_rating IS NULL",
        )
        .bind(i64::from(rating))
        .bind(id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Count conversations in any of `statuses`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn count_by_status(&self, statuses: &[ConversationStatus]) -> Result<u64> {
        if statuses.is_empty() {
            return Ok(0);
        }
        let query = format!(
            "SELECT COUNT(*) FROM conversation WHERE status IN ({})",
            status_list(statuses)
        );
        let row: (i64,) = sqlx::query_as(&query).fetch_one(self.db.as_ref()).await?;
        Ok(to_count(row.0))
    }

    /// Count conversations an agent currently holds.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn count_held_by(&self, agent_id: &str) -> Result<u64> {
        let held: Vec<ConversationStatus> = ConversationStatus::ALL
            .into_iter()
            .filter(|s| s.holds_agent())
            .collect();
        let query = format!(
            "SELECT COUNT(*) FROM conversation
             WHERE assigned_agent_id = ?1 AND status IN ({})",
            status_list(&held)
        );
        let row: (i64,) = sqlx::query_as(&query)
            .bind(agent_id)
            .fetch_one(self.db.as_ref())
            .await?;
        Ok(to_count(row.0))
    }

    /// Count conversations created at or after `since`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn count_created_since(&self, since: DateTime<Utc>) -> Result<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM conversation WHERE created_at >= ?1")
            .bind(fmt_ts(since))
            .fetch_one(self.db.as_ref())
            .await?;
        Ok(to_count(row.0))
    }

    /// Creation and first-response pairs for responses at or after `since`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query or timestamp parsing fails.
    pub async fn response_pairs_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, DateTime<Utc>)>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT created_at, first_response_at FROM conversation
             WHERE first_response_at IS NOT NULL AND first_response_at >= ?1",
        )
        .bind(fmt_ts(since))
        .fetch_all(self.db.as_ref())
        .await?;

        rows.iter()
            .map(|(created, first)| {
                Ok((
                    parse_ts("created_at", created)?,
                    parse_ts("first_response_at", first)?,
                ))
            })
            .collect()
    }

    /// Mean rating of conversations closed at or after `since`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn average_rating_since(&self, since: DateTime<Utc>) -> Result<Option<f64>> {
        let row: (Option<f64>,) = sqlx::query_as(
            "SELECT AVG(user_rating) FROM conversation
             WHERE status = 'closed' AND user_rating IS NOT NULL AND closed_at >= ?1",
        )
        .bind(fmt_ts(since))
        .fetch_one(self.db.as_ref())
        .await?;
        Ok(row.0)
    }
}
