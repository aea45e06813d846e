//! Persistence layer modules.

use std::future::Future;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;

use crate::{AppError, Result};

pub mod agent_repo;
pub mod conversation_repo;
pub mod db;
pub mod message_repo;
pub mod retention;
pub mod role_repo;
pub mod schema;

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;

/// Format a timestamp for storage.
///
/// Fixed microsecond precision with a `Z` suffix keeps lexical order equal
/// to chronological order, so range filters and `ORDER BY` work on the text.
#[must_use]
pub fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp column.
pub(crate) fn parse_ts(column: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Db(format!("invalid {column}: {e}")))
}

/// Parse an optional stored timestamp column.
pub(crate) fn parse_opt_ts(column: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_ts(column, v)).transpose()
}

/// Run an idempotent read, retrying once on an infrastructure failure.
///
/// Never wrap mutations in this helper: a retried write could apply twice.
///
/// # Errors
///
/// Returns the error of the second attempt, or any non-internal error from
/// the first attempt unchanged.
pub async fn retry_read<T, F, Fut>(mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match op().await {
        Err(err) if err.is_internal() => {
            warn!(%err, "read failed, retrying once");
            op().await
        }
        other => other,
    }
}
