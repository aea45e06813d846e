//! Concurrent callers must never overbook an agent or duplicate a session.

use std::collections::HashSet;
use std::sync::Arc;

use livechat::models::agent::AgentStatus;
use livechat::models::conversation::ConversationStatus;
use livechat::models::message::SenderType;
use livechat::orchestrator::lifecycle::ConversationLifecycle;
use livechat::persistence::db::Database;
use livechat::AppError;

use super::test_helpers::{
    assert_pairing, file_lifecycle, offline_agent, online_agent, role, start, test_lifecycle,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_assigns_respect_capacity() {
    let (lifecycle, db) = test_lifecycle().await;
    assigns_respect_capacity(&lifecycle, &db).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_assigns_respect_capacity_on_disk() {
    let (lifecycle, db, _dir) = file_lifecycle().await;
    assigns_respect_capacity(&lifecycle, &db).await;
}

async fn assigns_respect_capacity(lifecycle: &ConversationLifecycle, db: &Arc<Database>) {
    let support = role(lifecycle, "support", 3, 1).await;
    let agent = offline_agent(lifecycle, &support, "Ann").await;

    let mut ids = Vec::new();
    for n in 0..100 {
        let c = lifecycle
            .start_conversation(start(&format!("sess-{n}")))
            .await
            .expect("start");
        ids.push(c.id);
    }
    lifecycle
        .registry()
        .set_availability(&agent.id, AgentStatus::Online, true)
        .await
        .expect("online");

    let handles: Vec<_> = ids
        .into_iter()
        .map(|id| {
            let lifecycle = lifecycle.clone();
            let agent_id = agent.id.clone();
            tokio::spawn(async move { lifecycle.assign(&id, &agent_id).await })
        })
        .collect();

    let mut ok = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.expect("task") {
            Ok(_) => ok += 1,
            Err(AppError::CapacityExceeded(_)) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(ok, 3);
    assert_eq!(rejected, 97);

    let agent = lifecycle.registry().agent(&agent.id).await.expect("agent");
    assert_eq!(agent.current_load, 3);
    assert_pairing(lifecycle, db).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_starts_share_one_conversation() {
    let (lifecycle, _db) = test_lifecycle().await;

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let lifecycle = lifecycle.clone();
            tokio::spawn(async move { lifecycle.start_conversation(start("shared")).await })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        let conversation = handle.await.expect("task").expect("start");
        ids.insert(conversation.id);
    }
    assert_eq!(ids.len(), 1);

    let open = lifecycle
        .conversations(&ConversationStatus::OPEN)
        .await
        .expect("list");
    assert_eq!(open.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_passes_do_not_double_assign() {
    let (lifecycle, db) = test_lifecycle().await;
    passes_do_not_double_assign(&lifecycle, &db).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_passes_do_not_double_assign_on_disk() {
    let (lifecycle, db, _dir) = file_lifecycle().await;
    passes_do_not_double_assign(&lifecycle, &db).await;
}

async fn passes_do_not_double_assign(lifecycle: &ConversationLifecycle, db: &Arc<Database>) {
    let support = role(lifecycle, "support", 3, 1).await;
    let agent = offline_agent(lifecycle, &support, "Ann").await;
    for n in 0..10 {
        lifecycle
            .start_conversation(start(&format!("sess-{n}")))
            .await
            .expect("start");
    }
    lifecycle
        .registry()
        .set_availability(&agent.id, AgentStatus::Online, true)
        .await
        .expect("online");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let lifecycle = lifecycle.clone();
            tokio::spawn(async move { lifecycle.run_assignment_pass().await })
        })
        .collect();

    let mut assigned = 0;
    for handle in handles {
        assigned += handle.await.expect("task").expect("pass").assigned;
    }
    assert_eq!(assigned, 3);

    let waiting = lifecycle
        .conversations(&[ConversationStatus::Waiting])
        .await
        .expect("waiting");
    assert_eq!(waiting.len(), 7);
    assert_pairing(lifecycle, db).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_messages_keep_timestamps_in_order() {
    let (lifecycle, _db, _dir) = file_lifecycle().await;
    let support = role(&lifecycle, "support", 1, 1).await;
    online_agent(&lifecycle, &support, "Ann").await;
    let conversation = lifecycle.start_conversation(start("chatty")).await.expect("start");
    assert_eq!(conversation.status, ConversationStatus::Assigned);

    let handles: Vec<_> = (0..60)
        .map(|n| {
            let lifecycle = lifecycle.clone();
            let id = conversation.id.clone();
            let sender = if n % 3 == 0 { SenderType::Agent } else { SenderType::User };
            tokio::spawn(async move {
                lifecycle.record_message(&id, sender, &format!("message {n}")).await
            })
        })
        .collect();
    for handle in handles {
        handle.await.expect("task").expect("record");
    }

    let messages = lifecycle.messages(&conversation.id).await.expect("messages");
    assert_eq!(messages.len(), 60);
    for pair in messages.windows(2) {
        assert!(
            pair[0].created_at <= pair[1].created_at,
            "{} stored after {} but stamped earlier",
            pair[1].id,
            pair[0].id
        );
    }

    let stored = lifecycle.conversation(&conversation.id).await.expect("conversation");
    let first_agent = messages
        .iter()
        .find(|m| m.sender_type == SenderType::Agent)
        .expect("agent message");
    assert_eq!(stored.status, ConversationStatus::Active);
    assert_eq!(stored.first_response_at, Some(first_agent.created_at));
}
