//! Retention purge of terminal conversations and their messages.

use std::sync::Arc;

use chrono::{Duration, Utc};
use livechat::models::conversation::{Contact, Conversation, ConversationStatus, Priority};
use livechat::models::message::{Message, SenderType};
use livechat::persistence::conversation_repo::ConversationRepo;
use livechat::persistence::db;
use livechat::persistence::message_repo::MessageRepo;
use livechat::persistence::retention::{purge, spawn_retention_task};
use livechat::AppError;
use tokio_util::sync::CancellationToken;

fn ended(session: &str, status: ConversationStatus, days_ago: i64) -> Conversation {
    let mut c = Conversation::new(
        session.into(),
        "general".into(),
        Priority::Normal,
        Contact::default(),
        serde_json::Map::new(),
    );
    let at = Utc::now() - Duration::days(days_ago);
    c.status = status;
    c.created_at = at - Duration::hours(1);
    c.updated_at = at;
    if status.is_terminal() {
        c.closed_at = Some(at);
    }
    c
}

#[tokio::test]
async fn purge_removes_only_expired_terminal_conversations() {
    let db = Arc::new(db::connect_memory().await.expect("db"));
    let conversations = ConversationRepo::new(Arc::clone(&db));
    let messages = MessageRepo::new(Arc::clone(&db));

    let old_closed = ended("old-closed", ConversationStatus::Closed, 40);
    let old_abandoned = ended("old-abandoned", ConversationStatus::Abandoned, 31);
    let recent_closed = ended("recent", ConversationStatus::Closed, 5);
    let old_waiting = ended("old-waiting", ConversationStatus::Waiting, 90);
    for c in [&old_closed, &old_abandoned, &recent_closed, &old_waiting] {
        conversations.create(c).await.expect("insert");
    }

    let mut conn = db.acquire().await.expect("conn");
    for c in [&old_closed, &recent_closed] {
        let message = Message::new(c.id.clone(), SenderType::User, "hello".into());
        MessageRepo::append_in(&mut conn, &message).await.expect("message");
    }
    drop(conn);

    let purged = purge(&db, 30).await.expect("purge");
    assert_eq!(purged, 2);

    assert!(matches!(
        conversations.get_by_id(&old_closed.id).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        conversations.get_by_id(&old_abandoned.id).await,
        Err(AppError::NotFound(_))
    ));
    assert!(messages
        .list_for_conversation(&old_closed.id)
        .await
        .expect("list")
        .is_empty());

    conversations.get_by_id(&recent_closed.id).await.expect("recent kept");
    conversations.get_by_id(&old_waiting.id).await.expect("open kept");
    assert_eq!(
        messages
            .list_for_conversation(&recent_closed.id)
            .await
            .expect("list")
            .len(),
        1
    );
}

#[tokio::test]
async fn purge_on_empty_store_is_a_no_op() {
    let db = db::connect_memory().await.expect("db");
    assert_eq!(purge(&db, 30).await.expect("purge"), 0);
}

#[tokio::test]
async fn retention_task_stops_on_cancel() {
    let db = Arc::new(db::connect_memory().await.expect("db"));
    let cancel = CancellationToken::new();
    let handle = spawn_retention_task(Arc::clone(&db), 30, cancel.clone());

    cancel.cancel();
    tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .expect("task ends promptly")
        .expect("task did not panic");
}
