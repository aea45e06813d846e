//! Agent role repository for `SQLite` persistence.

use std::sync::Arc;

use crate::models::agent::AgentRole;
use crate::{AppError, Result};

use super::db::Database;
use super::{fmt_ts, parse_ts};

/// Repository wrapper around `SQLite` for role records.
#[derive(Clone)]
pub struct RoleRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct RoleRow {
    id: String,
    name: String,
    description: String,
    max_concurrent_chats: i64,
    priority: i64,
    created_at: String,
}

impl RoleRow {
    fn into_role(self) -> Result<AgentRole> {
        Ok(AgentRole {
            max_concurrent_chats: u32::try_from(self.max_concurrent_chats)
                .map_err(|e| AppError::Db(format!("invalid max_concurrent_chats: {e}")))?,
            priority: i32::try_from(self.priority)
                .map_err(|e| AppError::Db(format!("invalid role priority: {e}")))?,
            created_at: parse_ts("created_at", &self.created_at)?,
            id: self.id,
            name: self.name,
            description: self.description,
        })
    }
}

impl RoleRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new role.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Conflict` if the name is taken, or `AppError::Db`
    /// if the insert fails.
    pub async fn create(&self, role: &AgentRole) -> Result<AgentRole> {
        let result = sqlx::query(
            "INSERT INTO agent_role (id, name, description, max_concurrent_chats, priority, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&role.id)
        .bind(&role.name)
        .bind(&role.description)
        .bind(i64::from(role.max_concurrent_chats))
        .bind(i64::from(role.priority))
        .bind(fmt_ts(role.created_at))
        .execute(self.db.as_ref())
        .await;

        match result {
            Ok(_) => Ok(role.clone()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
                AppError::Conflict(format!("role name '{}' already exists", role.name)),
            ),
            Err(err) => Err(err.into()),
        }
    }

    /// Retrieve a role by identifier.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the role does not exist.
    pub async fn get_by_id(&self, id: &str) -> Result<AgentRole> {
        let row: Option<RoleRow> = sqlx::query_as(
            "SELECT id, name, description, max_concurrent_chats, priority, created_at
             FROM agent_role WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(self.db.as_ref())
        .await?;

        row.ok_or_else(|| AppError::NotFound(format!("role {id} not found")))?
            .into_role()
    }

    /// List all roles, highest routing priority first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list(&self) -> Result<Vec<AgentRole>> {
        let rows: Vec<RoleRow> = sqlx::query_as(
            "SELECT id, name, description, max_concurrent_chats, priority, created_at
             FROM agent_role ORDER BY priority ASC, name ASC",
        )
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(RoleRow::into_role).collect()
    }
}
