//! Agent repository for `SQLite` persistence.
//!
//! `current_load` is only ever changed through [`AgentRepo::increment_load_in`]
//! and [`AgentRepo::decrement_load_in`]. Both are single conditional `UPDATE`
//! statements, so concurrent callers can never push the counter past the
//! role limit or below zero.

use std::sync::Arc;

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::warn;

use crate::models::agent::{Agent, AgentCapacity, AgentStatus};
use crate::{AppError, Result};

use super::db::Database;
use super::{fmt_ts, parse_ts};

/// Repository wrapper around `SQLite` for agent records.
#[derive(Clone)]
pub struct AgentRepo {
    db: Arc<Database>,
}

const CAPACITY_SELECT: &str = "SELECT a.id, a.role_id, a.display_name, a.email, a.status,
        a.is_available, a.current_load, a.created_at, a.updated_at,
        r.name AS role_name, r.priority AS role_priority, r.max_concurrent_chats
 FROM agent a JOIN agent_role r ON r.id = a.role_id";

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct AgentRow {
    id: String,
    role_id: String,
    display_name: String,
    email: Option<String>,
    status: String,
    is_available: i64,
    current_load: i64,
    created_at: String,
    updated_at: String,
}

impl AgentRow {
    fn into_agent(self) -> Result<Agent> {
        Ok(Agent {
            status: self.status.parse::<AgentStatus>().map_err(|e| AppError::Db(e.to_string()))?,
            current_load: u32::try_from(self.current_load)
                .map_err(|e| AppError::Db(format!("invalid current_load: {e}")))?,
            created_at: parse_ts("created_at", &self.created_at)?,
            updated_at: parse_ts("updated_at", &self.updated_at)?,
            is_available: self.is_available != 0,
            id: self.id,
            role_id: self.role_id,
            display_name: self.display_name,
            email: self.email,
        })
    }
}

/// Agent row joined with its role.
#[derive(sqlx::FromRow)]
struct CapacityRow {
    #[sqlx(flatten)]
    agent: AgentRow,
    role_name: String,
    role_priority: i64,
    max_concurrent_chats: i64,
}

impl CapacityRow {
    fn into_capacity(self) -> Result<AgentCapacity> {
        Ok(AgentCapacity {
            agent: self.agent.into_agent()?,
            role_name: self.role_name,
            role_priority: i32::try_from(self.role_priority)
                .map_err(|e| AppError::Db(format!("invalid role priority: {e}")))?,
            max_concurrent_chats: u32::try_from(self.max_concurrent_chats)
                .map_err(|e| AppError::Db(format!("invalid max_concurrent_chats: {e}")))?,
        })
    }
}

impl AgentRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new agent record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn create(&self, agent: &Agent) -> Result<Agent> {
        sqlx::query(
            "INSERT INTO agent (id, role_id, display_name, email, status, is_available,
             current_load, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&agent.id)
        .bind(&agent.role_id)
        .bind(&agent.display_name)
        .bind(&agent.email)
        .bind(agent.status.as_str())
        .bind(i64::from(agent.is_available))
        .bind(i64::from(agent.current_load))
        .bind(fmt_ts(agent.created_at))
        .bind(fmt_ts(agent.updated_at))
        .execute(self.db.as_ref())
        .await?;

        Ok(agent.clone())
    }

    /// Retrieve an agent by identifier.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the agent does not exist.
    pub async fn get_by_id(&self, id: &str) -> Result<Agent> {
        let row: Option<AgentRow> = sqlx::query_as(
            "SELECT id, role_id, display_name, email, status, is_available, current_load,
             created_at, updated_at FROM agent WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(self.db.as_ref())
        .await?;

        row.ok_or_else(|| AppError::NotFound(format!("agent {id} not found")))?
            .into_agent()
    }

    /// List every agent with its role capacity.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_with_capacity(&self) -> Result<Vec<AgentCapacity>> {
        let query = format!("{CAPACITY_SELECT} ORDER BY a.display_name ASC, a.id ASC");
        let rows: Vec<CapacityRow> = sqlx::query_as(&query).fetch_all(self.db.as_ref()).await?;
        rows.into_iter().map(CapacityRow::into_capacity).collect()
    }

    /// List agents that are online and available, including those at capacity.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_accepting(&self) -> Result<Vec<AgentCapacity>> {
        let query = format!(
            "{CAPACITY_SELECT} WHERE a.status = 'online' AND a.is_available = 1 ORDER BY a.id ASC"
        );
        let rows: Vec<CapacityRow> = sqlx::query_as(&query).fetch_all(self.db.as_ref()).await?;
        rows.into_iter().map(CapacityRow::into_capacity).collect()
    }

    /// Count agents that are online, available, and under capacity.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn count_eligible(&self) -> Result<u64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM agent a JOIN agent_role r ON r.id = a.role_id
             WHERE a.status = 'online' AND a.is_available = 1
               AND a.current_load < r.max_concurrent_chats",
        )
        .fetch_one(self.db.as_ref())
        .await?;
        Ok(u64::try_from(row.0).unwrap_or_default())
    }

    /// Update presence and availability.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the agent does not exist.
    pub async fn set_availability(
        &self,
        id: &str,
        status: AgentStatus,
        is_available: bool,
    ) -> Result<Agent> {
        let result = sqlx::query(
            "UPDATE agent SET status = ?1, is_available = ?2, updated_at = ?3 WHERE id = ?4",
        )
        .bind(status.as_str())
        .bind(i64::from(is_available))
        .bind(fmt_ts(Utc::now()))
        .bind(id)
        .execute(self.db.as_ref())
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("agent {id} not found")));
        }
        self.get_by_id(id).await
    }

    /// Take one capacity unit from an agent using the pool.
    ///
    /// # Errors
    ///
    /// See [`Self::increment_load_in`].
    pub async fn increment_load(&self, id: &str) -> Result<()> {
        let mut conn = self.db.acquire().await?;
        Self::increment_load_in(&mut conn, id).await
    }

    /// Release one capacity unit from an agent using the pool.
    ///
    /// # Errors
    ///
    /// See [`Self::decrement_load_in`].
    pub async fn decrement_load(&self, id: &str) -> Result<()> {
        let mut conn = self.db.acquire().await?;
        Self::decrement_load_in(&mut conn, id).await
    }

    /// Take one capacity unit on `conn`, typically inside a transaction.
    ///
    /// The agent must be online, available, and below its role limit at the
    /// moment the statement runs.
    ///
    /// # Errors
    ///
    /// Returns `AppError::CapacityExceeded` if the agent is not eligible,
    /// `AppError::NotFound` if it does not exist.
    pub async fn increment_load_in(conn: &mut SqliteConnection, id: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE agent SET current_load = current_load + 1
             WHERE id = ?1 AND status = 'online' AND is_available = 1
               AND current_load < (SELECT r.max_concurrent_chats FROM agent_role r
                                   WHERE r.id = agent.role_id)",
        )
        .bind(id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }
        if Self::exists_in(conn, id).await? {
            Err(AppError::CapacityExceeded(format!(
                "agent {id} is not eligible for new conversations"
            )))
        } else {
            Err(AppError::NotFound(format!("agent {id} not found")))
        }
    }

    /// Release one capacity unit on `conn`, flooring at zero.
    ///
    /// An underflow means a release without a matching take somewhere
    /// upstream; it is logged, not propagated.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the agent does not exist.
    pub async fn decrement_load_in(conn: &mut SqliteConnection, id: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE agent SET current_load = current_load - 1 WHERE id = ?1 AND current_load > 0",
        )
        .bind(id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }
        if Self::exists_in(conn, id).await? {
            warn!(agent_id = id, "load decrement below zero ignored");
            Ok(())
        } else {
            Err(AppError::NotFound(format!("agent {id} not found")))
        }
    }

    async fn exists_in(conn: &mut SqliteConnection, id: &str) -> Result<bool> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM agent WHERE id = ?1")
            .bind(id)
            .fetch_one(&mut *conn)
            .await?;
        Ok(row.0 > 0)
    }
}
