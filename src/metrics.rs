//! Read-only dashboard statistics.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::config::MetricsConfig;
use crate::models::conversation::ConversationStatus;
use crate::models::stats::DashboardStats;
use crate::persistence::agent_repo::AgentRepo;
use crate::persistence::conversation_repo::ConversationRepo;
use crate::persistence::db::Database;
use crate::persistence::retry_read;
use crate::Result;

/// Computes [`DashboardStats`] and caches the last snapshot briefly.
#[derive(Clone)]
pub struct MetricsAggregator {
    conversations: ConversationRepo,
    agents: AgentRepo,
    config: MetricsConfig,
    cache: Arc<Mutex<Option<(Instant, DashboardStats)>>>,
}

impl MetricsAggregator {
    /// Create an aggregator over the shared pool.
    #[must_use]
    pub fn new(db: Arc<Database>, config: MetricsConfig) -> Self {
        Self {
            conversations: ConversationRepo::new(Arc::clone(&db)),
            agents: AgentRepo::new(db),
            config,
            cache: Arc::new(Mutex::new(None)),
        }
    }

    /// Current statistics, served from cache while fresh.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the store fails twice in a row.
    pub async fn dashboard_stats(&self) -> Result<DashboardStats> {
        let ttl = Duration::from_secs(self.config.cache_seconds);
        if let Some(stats) = self.cached(ttl) {
            return Ok(stats);
        }

        let stats = self.compute_at(Utc::now()).await?;
        if !ttl.is_zero() {
            match self.cache.lock() {
                Ok(mut slot) => *slot = Some((Instant::now(), stats.clone())),
                Err(_) => warn!("metrics cache lock poisoned"),
            }
        }
        Ok(stats)
    }

    /// Compute a fresh snapshot as of `now`, bypassing the cache.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the store fails twice in a row.
    pub async fn compute_at(&self, now: DateTime<Utc>) -> Result<DashboardStats> {
        let active_chats = retry_read(|| {
            self.conversations.count_by_status(&[
                ConversationStatus::Assigned,
                ConversationStatus::Active,
            ])
        })
        .await?;
        let waiting_chats = retry_read(|| {
            self.conversations
                .count_by_status(&[ConversationStatus::Waiting])
        })
        .await?;
        let available_agents = retry_read(|| self.agents.count_eligible()).await?;

        let response_since = now - chrono::Duration::hours(i64::from(self.config.response_window_hours));
        let pairs = retry_read(|| self.conversations.response_pairs_since(response_since)).await?;
        let avg_response_time_seconds = mean(
            pairs
                .iter()
                .map(|(created, first)| millis_to_secs((*first - *created).num_milliseconds())),
        );

        let rating_since =
            now - chrono::Duration::days(i64::from(self.config.satisfaction_window_days));
        let satisfaction_score = retry_read(|| self.conversations.average_rating_since(rating_since))
            .await?
            .unwrap_or(0.0);

        let midnight = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map_or(now, |t| t.and_utc());
        let total_chats_today =
            retry_read(|| self.conversations.count_created_since(midnight)).await?;

        debug!(active_chats, waiting_chats, available_agents, "dashboard stats computed");
        Ok(DashboardStats {
            active_chats,
            waiting_chats,
            available_agents,
            avg_response_time_seconds,
            satisfaction_score,
            total_chats_today,
            computed_at: Some(now),
        })
    }

    /// Drop the cached snapshot.
    pub fn invalidate(&self) {
        if let Ok(mut slot) = self.cache.lock() {
            *slot = None;
        }
    }

    fn cached(&self, ttl: Duration) -> Option<DashboardStats> {
        let slot = self.cache.lock().ok()?;
        slot.as_ref()
            .filter(|(at, _)| at.elapsed() < ttl)
            .map(|(_, stats)| stats.clone())
    }
}

#[allow(clippy::cast_precision_loss)] // millisecond spans fit comfortably in f64.
fn millis_to_secs(millis: i64) -> f64 {
    millis as f64 / 1000.0
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0_u32), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / f64::from(count)
    }
}
