//! Shared application state handed to the HTTP and IPC front ends.

use std::sync::Arc;

use crate::config::GlobalConfig;
use crate::metrics::MetricsAggregator;
use crate::orchestrator::events::EventBus;
use crate::orchestrator::lifecycle::ConversationLifecycle;
use crate::persistence::db::Database;

/// Everything a request handler needs.
pub struct AppState {
    /// Validated configuration.
    pub config: Arc<GlobalConfig>,
    /// Shared connection pool.
    pub db: Arc<Database>,
    /// Conversation state machine and agent registry.
    pub lifecycle: ConversationLifecycle,
    /// Dashboard statistics.
    pub metrics: MetricsAggregator,
}

impl AppState {
    /// Wire up the lifecycle manager and metrics over one pool.
    #[must_use]
    pub fn new(config: Arc<GlobalConfig>, db: Arc<Database>) -> Self {
        let lifecycle = ConversationLifecycle::new(Arc::clone(&db), &config, EventBus::default());
        let metrics = MetricsAggregator::new(Arc::clone(&db), config.metrics.clone());
        Self {
            config,
            db,
            lifecycle,
            metrics,
        }
    }
}
