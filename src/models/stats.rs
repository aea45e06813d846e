//! Dashboard statistics snapshot.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Point-in-time support desk statistics.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    /// Conversations in `assigned` or `active`.
    pub active_chats: u64,
    /// Conversations in `waiting`.
    pub waiting_chats: u64,
    /// Agents currently eligible for new work.
    pub available_agents: u64,
    /// Mean first-response time over the trailing window.
    pub avg_response_time_seconds: f64,
    /// Mean visitor rating over the trailing window.
    pub satisfaction_score: f64,
    /// Conversations created since UTC midnight.
    pub total_chats_today: u64,
    /// When this snapshot was computed.
    pub computed_at: Option<DateTime<Utc>>,
}
