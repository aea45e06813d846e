//! Retention service for time-based data purge.
//!
//! Runs as a background task deleting messages first, then closed and
//! abandoned conversations older than `retention_days`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::db::Database;
use super::fmt_ts;
use crate::Result;

const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

/// Spawn the retention purge background task.
///
/// The task runs hourly. On each tick it deletes terminal conversations,
/// and their messages, that ended more than `retention_days` ago.
#[must_use]
pub fn spawn_retention_task(
    db: Arc<Database>,
    retention_days: u32,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("retention task shutting down");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(err) = purge(&db, retention_days).await {
                        error!(%err, "retention purge failed");
                    }
                }
            }
        }
    })
}

/// Delete terminal conversations that ended more than `retention_days` ago.
///
/// Returns the number of conversations removed.
///
/// # Errors
///
/// Returns `AppError::Db` if any delete fails.
pub async fn purge(db: &Database, retention_days: u32) -> Result<u64> {
    let cutoff = fmt_ts(Utc::now() - chrono::Duration::days(i64::from(retention_days)));

    let mut tx = db.begin().await?;

    sqlx::query(
        "DELETE FROM chat_message WHERE conversation_id IN
         (SELECT id FROM conversation
          WHERE status IN ('closed','abandoned') AND closed_at < ?1)",
    )
    .bind(&cutoff)
    .execute(&mut *tx)
    .await?;

    let result = sqlx::query(
        "DELETE FROM conversation WHERE status IN ('closed','abandoned') AND closed_at < ?1",
    )
    .bind(&cutoff)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let purged = result.rows_affected();
    info!(retention_days, purged, "retention purge completed");
    Ok(purged)
}
