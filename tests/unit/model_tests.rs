use chrono::Duration;
use livechat::models::agent::{Agent, AgentCapacity, AgentRole, AgentStatus};
use livechat::models::conversation::{
    validate_rating, Contact, Conversation, ConversationStatus, Priority,
};
use livechat::models::message::{Message, SenderType};
use livechat::AppError;

fn conversation() -> Conversation {
    Conversation::new(
        "sess-1".into(),
        "general".into(),
        Priority::Normal,
        Contact::default(),
        serde_json::Map::new(),
    )
}

#[test]
fn new_conversation_is_waiting_without_agent() {
    let c = conversation();
    assert_eq!(c.status, ConversationStatus::Waiting);
    assert!(c.assigned_agent_id.is_none());
    assert!(c.first_response_at.is_none());
    assert!(c.user_rating.is_none());
    assert_eq!(c.created_at, c.updated_at);
}

#[test]
fn transition_table_allows_only_lifecycle_edges() {
    use ConversationStatus::{Abandoned, Active, Assigned, Closed, Waiting};

    let allowed = [
        (Waiting, Assigned),
        (Waiting, Abandoned),
        (Assigned, Active),
        (Assigned, Closed),
        (Assigned, Waiting),
        (Active, Closed),
    ];
    let all = [Waiting, Assigned, Active, Closed, Abandoned];
    for from in all {
        for to in all {
            assert_eq!(
                from.can_transition_to(to),
                allowed.contains(&(from, to)),
                "{from} -> {to}"
            );
        }
    }
}

#[test]
fn sources_follow_the_transition_table() {
    use ConversationStatus::{Abandoned, Active, Assigned, Closed, Waiting};

    assert_eq!(ConversationStatus::sources(Closed), vec![Assigned, Active]);
    assert_eq!(ConversationStatus::sources(Waiting), vec![Assigned]);
    assert_eq!(ConversationStatus::sources(Abandoned), vec![Waiting]);
}

#[test]
fn terminal_statuses_have_no_exits() {
    for status in [ConversationStatus::Closed, ConversationStatus::Abandoned] {
        assert!(status.is_terminal());
        assert!(!status.holds_agent());
    }
    assert!(ConversationStatus::Assigned.holds_agent());
    assert!(ConversationStatus::Active.holds_agent());
    assert!(!ConversationStatus::Waiting.holds_agent());
}

#[test]
fn status_and_priority_parse_their_storage_form() {
    for status in [
        ConversationStatus::Waiting,
        ConversationStatus::Assigned,
        ConversationStatus::Active,
        ConversationStatus::Closed,
        ConversationStatus::Abandoned,
    ] {
        assert_eq!(status.as_str().parse::<ConversationStatus>().unwrap(), status);
    }
    assert_eq!("urgent".parse::<Priority>().unwrap(), Priority::Urgent);
    assert!(matches!(
        "critical".parse::<Priority>(),
        Err(AppError::InvalidInput(_))
    ));
}

#[test]
fn priority_orders_ascending() {
    assert!(Priority::Low < Priority::Normal);
    assert!(Priority::Normal < Priority::High);
    assert!(Priority::High < Priority::Urgent);
    assert_eq!(Priority::default(), Priority::Normal);
}

#[test]
fn rating_bounds() {
    assert_eq!(validate_rating(1).unwrap(), 1);
    assert_eq!(validate_rating(5).unwrap(), 5);
    assert!(matches!(validate_rating(0), Err(AppError::InvalidInput(_))));
    assert!(matches!(validate_rating(6), Err(AppError::InvalidInput(_))));
}

#[test]
fn response_time_is_measured_from_creation() {
    let mut c = conversation();
    assert!(c.response_time_seconds().is_none());
    c.first_response_at = Some(c.created_at + Duration::milliseconds(2500));
    let secs = c.response_time_seconds().unwrap();
    assert!((secs - 2.5).abs() < 1e-9);
}

#[test]
fn conversation_json_flattens_contact() {
    let mut c = conversation();
    c.contact.user_name = Some("Ann".into());
    let json = serde_json::to_value(&c).unwrap();
    assert_eq!(json["user_name"], "Ann");
    assert_eq!(json["status"], "waiting");
    assert_eq!(json["priority"], "normal");
}

#[test]
fn new_agent_starts_offline() {
    let agent = Agent::new("role:1".into(), "Ann".into(), None);
    assert_eq!(agent.status, AgentStatus::Offline);
    assert!(!agent.is_available);
    assert_eq!(agent.current_load, 0);
    assert!(agent.id.starts_with("agent:"));
}

#[test]
fn capacity_eligibility_requires_presence_and_spare_slot() {
    let role = AgentRole::new("support".into(), String::new(), 2, 1);
    let mut agent = Agent::new(role.id.clone(), "Ann".into(), None);
    agent.status = AgentStatus::Online;
    agent.is_available = true;
    let mut cap = AgentCapacity {
        agent,
        role_name: role.name,
        role_priority: role.priority,
        max_concurrent_chats: role.max_concurrent_chats,
    };
    assert!(cap.is_eligible());
    assert_eq!(cap.spare(), 2);

    cap.agent.current_load = 2;
    assert!(!cap.is_eligible());

    cap.agent.current_load = 0;
    cap.agent.is_available = false;
    assert!(!cap.is_eligible());
    assert!(!cap.agent.is_accepting());
}

#[test]
fn message_ids_are_prefixed() {
    let message = Message::new("c1".into(), SenderType::User, "hi".into());
    assert!(message.id.starts_with("msg:"));
    assert_eq!("agent".parse::<SenderType>().unwrap(), SenderType::Agent);
}
