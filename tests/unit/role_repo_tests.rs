use std::sync::Arc;

use livechat::models::agent::AgentRole;
use livechat::persistence::{db, role_repo::RoleRepo};
use livechat::AppError;

#[tokio::test]
async fn in_memory_connect_creates_all_tables() {
    let pool = db::connect_memory().await.expect("in-memory connect");

    for table in ["agent_role", "agent", "conversation", "chat_message"] {
        let query = format!("SELECT COUNT(*) FROM {table}");
        let row: (i64,) = sqlx::query_as(&query)
            .fetch_one(&pool)
            .await
            .unwrap_or_else(|e| panic!("table '{table}' should be queryable: {e}"));
        assert_eq!(row.0, 0, "table '{table}' should start empty");
    }
}

#[tokio::test]
async fn create_and_fetch_role() {
    let repo = RoleRepo::new(Arc::new(db::connect_memory().await.expect("db")));
    let role = AgentRole::new("support".into(), "first line".into(), 3, 1);
    repo.create(&role).await.expect("create role");

    let fetched = repo.get_by_id(&role.id).await.expect("fetch role");
    assert_eq!(fetched.name, "support");
    assert_eq!(fetched.description, "first line");
    assert_eq!(fetched.max_concurrent_chats, 3);
    assert_eq!(fetched.priority, 1);
}

#[tokio::test]
async fn duplicate_role_name_conflicts() {
    let repo = RoleRepo::new(Arc::new(db::connect_memory().await.expect("db")));
    repo.create(&AgentRole::new("support".into(), String::new(), 3, 1))
        .await
        .expect("first");
    let err = repo
        .create(&AgentRole::new("support".into(), String::new(), 5, 2))
        .await
        .expect_err("duplicate name");
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn unknown_role_is_not_found() {
    let repo = RoleRepo::new(Arc::new(db::connect_memory().await.expect("db")));
    assert!(matches!(
        repo.get_by_id("role:missing").await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn roles_list_in_priority_order() {
    let repo = RoleRepo::new(Arc::new(db::connect_memory().await.expect("db")));
    repo.create(&AgentRole::new("senior".into(), String::new(), 2, 5))
        .await
        .expect("senior");
    repo.create(&AgentRole::new("junior".into(), String::new(), 4, 1))
        .await
        .expect("junior");

    let names: Vec<String> = repo
        .list()
        .await
        .expect("list")
        .into_iter()
        .map(|r| r.name)
        .collect();
    assert_eq!(names, vec!["junior", "senior"]);
}
