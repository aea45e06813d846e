//! Route handlers and their request bodies.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::stream::{self, Stream};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use super::error::{ApiError, JsonBody};
use crate::models::agent::{Agent, AgentCapacity, AgentRole, AgentStatus};
use crate::models::conversation::{Conversation, ConversationStatus};
use crate::models::message::{Message, SenderType};
use crate::models::stats::DashboardStats;
use crate::orchestrator::lifecycle::StartRequest;
use crate::registry::NewRole;
use crate::state::AppState;
use crate::AppError;

/// Header carrying the operator identity on administrative routes.
pub const ADMIN_HEADER: &str = "x-admin-id";

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let caller = headers
        .get(ADMIN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Unauthorized(format!("missing {ADMIN_HEADER} header")))?;
    state.config.ensure_admin(caller)?;
    Ok(())
}

/// Query string of `GET /api/conversations`.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Comma-separated statuses; defaults to every open status.
    pub status: Option<String>,
}

/// Body of `POST /api/conversations/{id}/messages`.
#[derive(Debug, Deserialize)]
pub struct PostMessage {
    /// Author class.
    pub sender_type: SenderType,
    /// Message text.
    pub content: String,
}

/// Body of `POST /api/conversations/{id}/close`; may be omitted.
#[derive(Debug, Default, Deserialize)]
pub struct CloseRequest {
    /// Optional visitor rating.
    pub rating: Option<u8>,
}

/// Body of `POST /api/conversations/{id}/rating`.
#[derive(Debug, Deserialize)]
pub struct RateRequest {
    /// Visitor rating, 1 to 5.
    pub rating: u8,
}

/// Body of `POST /api/conversations/{id}/assign`.
#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    /// Agent taking the conversation.
    pub agent_id: String,
}

/// Body of `POST /api/agents`.
#[derive(Debug, Deserialize)]
pub struct NewAgent {
    /// Role the agent belongs to.
    pub role_id: String,
    /// Name shown to visitors.
    pub display_name: String,
    /// Contact e-mail.
    pub email: Option<String>,
}

/// Body of `PUT /api/agents/{id}/availability`.
#[derive(Debug, Deserialize)]
pub struct AvailabilityRequest {
    /// Presence.
    pub status: AgentStatus,
    /// Whether the agent takes new conversations.
    pub is_available: bool,
}

/// `GET /health`
pub async fn health() -> &'static str {
    "ok"
}

/// `POST /api/conversations`
pub async fn start_conversation(
    State(state): State<Arc<AppState>>,
    JsonBody(request): JsonBody<StartRequest>,
) -> ApiResult<Conversation> {
    Ok(Json(state.lifecycle.start_conversation(request).await?))
}

/// `GET /api/conversations`
pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Vec<Conversation>> {
    let statuses = match query.status.as_deref().map(str::trim) {
        None | Some("") => ConversationStatus::OPEN.to_vec(),
        Some(raw) => raw
            .split(',')
            .map(|s| s.trim().parse())
            .collect::<crate::Result<Vec<ConversationStatus>>>()?,
    };
    Ok(Json(state.lifecycle.conversations(&statuses).await?))
}

/// `GET /api/conversations/{id}`
pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Conversation> {
    Ok(Json(state.lifecycle.conversation(&id).await?))
}

/// `GET /api/conversations/{id}/messages`
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Vec<Message>> {
    Ok(Json(state.lifecycle.messages(&id).await?))
}

/// `POST /api/conversations/{id}/messages`
pub async fn post_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<PostMessage>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let message = state
        .lifecycle
        .record_message(&id, body.sender_type, &body.content)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// `POST /api/conversations/{id}/close`
pub async fn close_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Conversation> {
    let request: CloseRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CloseRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| AppError::InvalidInput(format!("invalid close body: {err}")))?
    };
    Ok(Json(state.lifecycle.close(&id, request.rating).await?))
}

/// `POST /api/conversations/{id}/rating`
pub async fn rate_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<RateRequest>,
) -> ApiResult<Conversation> {
    Ok(Json(state.lifecycle.rate(&id, body.rating).await?))
}

/// `POST /api/conversations/{id}/assign` (admin)
pub async fn assign_conversation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<AssignRequest>,
) -> ApiResult<Conversation> {
    require_admin(&state, &headers)?;
    Ok(Json(state.lifecycle.assign(&id, &body.agent_id).await?))
}

/// `POST /api/conversations/{id}/requeue` (admin)
pub async fn requeue_conversation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Conversation> {
    require_admin(&state, &headers)?;
    Ok(Json(state.lifecycle.requeue(&id).await?))
}

/// `POST /api/roles` (admin)
pub async fn create_role(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    JsonBody(body): JsonBody<NewRole>,
) -> Result<(StatusCode, Json<AgentRole>), ApiError> {
    require_admin(&state, &headers)?;
    let role = state.lifecycle.registry().create_role(body).await?;
    Ok((StatusCode::CREATED, Json(role)))
}

/// `GET /api/roles` (admin)
pub async fn list_roles(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Vec<AgentRole>> {
    require_admin(&state, &headers)?;
    Ok(Json(state.lifecycle.registry().roles().await?))
}

/// `POST /api/agents` (admin)
pub async fn create_agent(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    JsonBody(body): JsonBody<NewAgent>,
) -> Result<(StatusCode, Json<Agent>), ApiError> {
    require_admin(&state, &headers)?;
    let agent = state
        .lifecycle
        .registry()
        .create_agent(&body.role_id, &body.display_name, body.email)
        .await?;
    Ok((StatusCode::CREATED, Json(agent)))
}

/// `GET /api/agents` (admin)
pub async fn list_agents(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Vec<AgentCapacity>> {
    require_admin(&state, &headers)?;
    Ok(Json(state.lifecycle.registry().agents().await?))
}

/// `PUT /api/agents/{id}/availability`
pub async fn set_availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<AvailabilityRequest>,
) -> ApiResult<Agent> {
    let agent = state
        .lifecycle
        .set_agent_availability(&id, body.status, body.is_available)
        .await?;
    Ok(Json(agent))
}

/// `GET /api/dashboard/stats` (admin)
pub async fn dashboard_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<DashboardStats> {
    require_admin(&state, &headers)?;
    Ok(Json(state.metrics.dashboard_stats().await?))
}

/// `GET /api/events`: server-sent change notifications.
pub async fn events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.lifecycle.events().subscribe();
    let stream = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => match Event::default().event(event.name()).json_data(&event) {
                    Ok(sse) => return Some((Ok(sse), rx)),
                    Err(err) => warn!(%err, "failed to encode event"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
