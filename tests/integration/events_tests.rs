//! Lifecycle changes are published on the event bus.

use livechat::models::agent::AgentStatus;
use livechat::models::conversation::ConversationStatus;
use livechat::models::message::SenderType;
use livechat::orchestrator::events::ChatEvent;
use tokio::sync::broadcast::error::TryRecvError;

use super::test_helpers::{offline_agent, role, start, test_lifecycle};

fn drain(rx: &mut tokio::sync::broadcast::Receiver<ChatEvent>) -> Vec<ChatEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Empty | TryRecvError::Closed) => return events,
            Err(TryRecvError::Lagged(_)) => {}
        }
    }
}

#[tokio::test]
async fn start_publishes_conversation_updated() {
    let (lifecycle, _db) = test_lifecycle().await;
    let mut rx = lifecycle.events().subscribe();

    let conversation = lifecycle.start_conversation(start("s1")).await.expect("start");

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        ChatEvent::ConversationUpdated { conversation: c }
            if c.id == conversation.id && c.status == ConversationStatus::Waiting
    )));
}

#[tokio::test]
async fn assignment_and_reply_publish_in_order() {
    let (lifecycle, _db) = test_lifecycle().await;
    let support = role(&lifecycle, "support", 1, 1).await;
    let agent = offline_agent(&lifecycle, &support, "Ann").await;
    let conversation = lifecycle.start_conversation(start("s1")).await.expect("start");

    let mut rx = lifecycle.events().subscribe();
    lifecycle
        .set_agent_availability(&agent.id, AgentStatus::Online, true)
        .await
        .expect("online");
    lifecycle
        .record_message(&conversation.id, SenderType::Agent, "hello")
        .await
        .expect("reply");

    let names: Vec<&str> = drain(&mut rx).iter().map(ChatEvent::name).collect();
    assert_eq!(
        names,
        vec![
            "conversation_updated",
            "agent_updated",
            "message_appended",
            "conversation_updated"
        ]
    );
}

#[tokio::test]
async fn failed_operations_publish_nothing() {
    let (lifecycle, _db) = test_lifecycle().await;
    let conversation = lifecycle.start_conversation(start("s1")).await.expect("start");

    let mut rx = lifecycle.events().subscribe();
    let _ = lifecycle.rate(&conversation.id, 5).await;
    let _ = lifecycle
        .record_message(&conversation.id, SenderType::Agent, "too early")
        .await;

    assert!(drain(&mut rx).is_empty());
}

#[test]
fn events_serialize_with_type_tag() {
    let message = livechat::models::message::Message::new(
        "conv-1".into(),
        SenderType::User,
        "hi".into(),
    );
    let json = serde_json::to_value(ChatEvent::MessageAppended { message }).expect("json");
    assert_eq!(json["type"], "message_appended");
    assert_eq!(json["message"]["content"], "hi");
}
