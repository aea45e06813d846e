//! Dashboard statistics over hand-placed conversations.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use livechat::config::MetricsConfig;
use livechat::metrics::MetricsAggregator;
use livechat::models::agent::AgentStatus;
use livechat::models::conversation::{Contact, Conversation, ConversationStatus, Priority};
use livechat::persistence::conversation_repo::ConversationRepo;
use livechat::persistence::db::{self, Database};

use super::test_helpers::{offline_agent, role, test_lifecycle};

fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0)
        .single()
        .expect("valid instant")
}

fn placed(session: &str, status: ConversationStatus, created: DateTime<Utc>) -> Conversation {
    let mut c = Conversation::new(
        session.into(),
        "general".into(),
        Priority::Normal,
        Contact::default(),
        serde_json::Map::new(),
    );
    c.status = status;
    c.created_at = created;
    c.updated_at = created;
    c
}

fn aggregator(db: &Arc<Database>) -> MetricsAggregator {
    MetricsAggregator::new(
        Arc::clone(db),
        MetricsConfig {
            cache_seconds: 0,
            ..MetricsConfig::default()
        },
    )
}

#[tokio::test]
async fn empty_store_reports_zeros() {
    let db = Arc::new(db::connect_memory().await.expect("db"));
    let stats = aggregator(&db).compute_at(noon()).await.expect("stats");

    assert_eq!(stats.active_chats, 0);
    assert_eq!(stats.waiting_chats, 0);
    assert_eq!(stats.available_agents, 0);
    assert_eq!(stats.total_chats_today, 0);
    assert!(stats.avg_response_time_seconds.abs() < f64::EPSILON);
    assert!(stats.satisfaction_score.abs() < f64::EPSILON);
    assert_eq!(stats.computed_at, Some(noon()));
}

#[tokio::test]
async fn windows_filter_response_and_rating_samples() {
    let db = Arc::new(db::connect_memory().await.expect("db"));
    let repo = ConversationRepo::new(Arc::clone(&db));
    let now = noon();

    // Answered after 60s and 30s inside the response window.
    let mut a = placed("a", ConversationStatus::Active, now - Duration::seconds(120));
    a.first_response_at = Some(now - Duration::seconds(60));
    let mut b = placed("b", ConversationStatus::Active, now - Duration::seconds(40));
    b.first_response_at = Some(now - Duration::seconds(10));
    // Answered two days ago: outside the 24h window.
    let mut stale = placed("stale", ConversationStatus::Closed, now - Duration::days(2));
    stale.first_response_at = Some(now - Duration::days(2) + Duration::seconds(600));
    stale.closed_at = Some(now - Duration::days(2) + Duration::seconds(900));

    let mut good = placed("good", ConversationStatus::Closed, now - Duration::hours(3));
    good.closed_at = Some(now - Duration::hours(1));
    good.user_rating = Some(4);
    let mut poor = placed("poor", ConversationStatus::Closed, now - Duration::hours(3));
    poor.closed_at = Some(now - Duration::hours(2));
    poor.user_rating = Some(2);
    let mut ancient = placed("ancient", ConversationStatus::Closed, now - Duration::days(60));
    ancient.closed_at = Some(now - Duration::days(45));
    ancient.user_rating = Some(5);

    let waiting = placed("waiting", ConversationStatus::Waiting, now - Duration::minutes(5));

    for c in [&a, &b, &stale, &good, &poor, &ancient, &waiting] {
        repo.create(c).await.expect("insert");
    }

    let stats = aggregator(&db).compute_at(now).await.expect("stats");
    assert_eq!(stats.active_chats, 2);
    assert_eq!(stats.waiting_chats, 1);
    assert!((stats.avg_response_time_seconds - 45.0).abs() < 1e-9);
    assert!((stats.satisfaction_score - 3.0).abs() < 1e-9);
    // a, b, good, poor, waiting were created since UTC midnight.
    assert_eq!(stats.total_chats_today, 5);
}

#[tokio::test]
async fn available_agents_counts_only_eligible() {
    let (lifecycle, db) = test_lifecycle().await;
    let support = role(&lifecycle, "support", 1, 1).await;
    let free = offline_agent(&lifecycle, &support, "Free").await;
    let busy = offline_agent(&lifecycle, &support, "Busy").await;
    let on_break = offline_agent(&lifecycle, &support, "Break").await;
    offline_agent(&lifecycle, &support, "Off").await;

    let registry = lifecycle.registry();
    for id in [&free.id, &busy.id] {
        registry
            .set_availability(id, AgentStatus::Online, true)
            .await
            .expect("online");
    }
    registry
        .set_availability(&on_break.id, AgentStatus::Online, false)
        .await
        .expect("on break");
    registry.increment_load(&busy.id).await.expect("fill busy");

    let stats = aggregator(&db).compute_at(Utc::now()).await.expect("stats");
    assert_eq!(stats.available_agents, 1);
}

#[tokio::test]
async fn cached_snapshot_is_served_until_invalidated() {
    let db = Arc::new(db::connect_memory().await.expect("db"));
    let metrics = MetricsAggregator::new(
        Arc::clone(&db),
        MetricsConfig {
            cache_seconds: 600,
            ..MetricsConfig::default()
        },
    );
    assert_eq!(metrics.dashboard_stats().await.expect("stats").waiting_chats, 0);

    ConversationRepo::new(Arc::clone(&db))
        .create(&placed("late", ConversationStatus::Waiting, Utc::now()))
        .await
        .expect("insert");
    assert_eq!(
        metrics.dashboard_stats().await.expect("cached").waiting_chats,
        0
    );

    metrics.invalidate();
    assert_eq!(metrics.dashboard_stats().await.expect("fresh").waiting_chats, 1);
}
