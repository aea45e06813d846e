//! HTTP API exercised over a real socket with `reqwest`.

use std::sync::Arc;

use livechat::api::handlers::ADMIN_HEADER;
use livechat::api::server::serve_listener;
use livechat::state::AppState;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::test_helpers::{test_app_state, test_config, ADMIN};

struct Server {
    base: String,
    client: reqwest::Client,
    state: Arc<AppState>,
    cancel: CancellationToken,
    handle: JoinHandle<livechat::Result<()>>,
}

impl Server {
    async fn start() -> Self {
        let state = test_app_state(test_config()).await;
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(serve_listener(listener, Arc::clone(&state), cancel.clone()));
        Self {
            base: format!("http://{addr}"),
            client: reqwest::Client::new(),
            state,
            cancel,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn post(&self, path: &str, body: &Value) -> (StatusCode, Value) {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("request");
        let status = response.status();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    async fn admin_post(&self, path: &str, body: &Value) -> (StatusCode, Value) {
        let response = self
            .client
            .post(self.url(path))
            .header(ADMIN_HEADER, ADMIN)
            .json(body)
            .send()
            .await
            .expect("request");
        let status = response.status();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    async fn get(&self, path: &str, admin: bool) -> (StatusCode, Value) {
        let mut request = self.client.get(self.url(path));
        if admin {
            request = request.header(ADMIN_HEADER, ADMIN);
        }
        let response = request.send().await.expect("request");
        let status = response.status();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    async fn stop(self) {
        self.cancel.cancel();
        self.handle
            .await
            .expect("server task")
            .expect("server shut down cleanly");
    }
}

#[tokio::test]
async fn health_returns_ok() {
    let server = Server::start().await;
    let body = server
        .client
        .get(server.url("/health"))
        .send()
        .await
        .expect("request")
        .text()
        .await
        .expect("body");
    assert_eq!(body, "ok");
    server.stop().await;
}

#[tokio::test]
async fn visitor_flow_start_message_close() {
    let server = Server::start().await;

    let (status, started) = server
        .post(
            "/api/conversations",
            &json!({
                "session_id": "web-1",
                "user_name": "Pat",
                "metadata": {"page": "/pricing"},
                "initial_message": "Hi there"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(started["status"], "waiting");
    assert_eq!(started["user_name"], "Pat");
    assert_eq!(started["metadata"]["page"], "/pricing");
    let id = started["id"].as_str().expect("id").to_owned();

    let (_, again) = server
        .post("/api/conversations", &json!({"session_id": "web-1"}))
        .await;
    assert_eq!(again["id"], started["id"]);

    let (status, message) = server
        .post(
            &format!("/api/conversations/{id}/messages"),
            &json!({"sender_type": "user", "content": "anyone?"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(message["content"], "anyone?");

    let (status, error) = server
        .post(
            &format!("/api/conversations/{id}/messages"),
            &json!({"sender_type": "agent", "content": "too early"}),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["error"], "conflict");

    let (_, messages) = server
        .get(&format!("/api/conversations/{id}/messages"), false)
        .await;
    assert_eq!(messages.as_array().map(Vec::len), Some(2));

    let response = server
        .client
        .post(server.url(&format!("/api/conversations/{id}/close")))
        .send()
        .await
        .expect("close");
    assert_eq!(response.status(), StatusCode::OK);
    let closed: Value = response.json().await.expect("json");
    assert_eq!(closed["status"], "abandoned");

    server.stop().await;
}

#[tokio::test]
async fn admin_routes_require_known_operator() {
    let server = Server::start().await;

    let (status, body) = server.get("/api/dashboard/stats", false).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let response = server
        .client
        .get(server.url("/api/roles"))
        .header(ADMIN_HEADER, "intruder")
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let (status, _) = server
        .post(
            "/api/roles",
            &json!({"name": "support", "max_concurrent_chats": 2}),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    server.stop().await;
}

#[tokio::test]
async fn staffed_desk_assigns_and_reports_stats() {
    let server = Server::start().await;

    let (status, role) = server
        .admin_post(
            "/api/roles",
            &json!({"name": "support", "max_concurrent_chats": 2, "priority": 1}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, agent) = server
        .admin_post(
            "/api/agents",
            &json!({"role_id": role["id"], "display_name": "Ann"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let agent_id = agent["id"].as_str().expect("agent id").to_owned();

    let response = server
        .client
        .put(server.url(&format!("/api/agents/{agent_id}/availability")))
        .json(&json!({"status": "online", "is_available": true}))
        .send()
        .await
        .expect("availability");
    assert_eq!(response.status(), StatusCode::OK);

    let (_, started) = server
        .post("/api/conversations", &json!({"session_id": "web-2"}))
        .await;
    assert_eq!(started["status"], "assigned");
    assert_eq!(started["assigned_agent_id"], agent_id.as_str());
    let id = started["id"].as_str().expect("id").to_owned();

    let (status, stats) = server.get("/api/dashboard/stats", true).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["activeChats"], 1);
    assert_eq!(stats["waitingChats"], 0);
    assert_eq!(stats["availableAgents"], 1);
    assert_eq!(stats["totalChatsToday"], 1);

    let (status, closed) = server
        .post(
            &format!("/api/conversations/{id}/close"),
            &json!({"rating": 5}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(closed["status"], "closed");
    assert_eq!(closed["user_rating"], 5);

    let (status, _) = server
        .post(&format!("/api/conversations/{id}/rating"), &json!({"rating": 4}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let agent = server.state.lifecycle.registry().agent(&agent_id).await.expect("agent");
    assert_eq!(agent.current_load, 0);

    server.stop().await;
}

#[tokio::test]
async fn errors_map_to_status_codes() {
    let server = Server::start().await;

    let (status, body) = server.get("/api/conversations/nope", false).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, body) = server.get("/api/conversations?status=bogus", false).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");

    let (status, _) = server
        .post("/api/conversations", &json!({"session_id": ""}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = server
        .admin_post(
            "/api/conversations/nope/assign",
            &json!({"agent_id": "agent:nope"}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = server
        .admin_post(
            "/api/roles",
            &json!({"name": "x", "max_concurrent_chats": -1}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");

    let (status, body) = server
        .post(
            "/api/conversations",
            &json!({"session_id": "web-9", "priority": "whenever"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");

    let response = server
        .client
        .post(server.url("/api/conversations"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.expect("json error body");
    assert_eq!(body["error"], "invalid_input");

    server.stop().await;
}
