//! HTTP listener and route table.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::handlers;
use crate::state::AppState;
use crate::{AppError, Result};

/// Build the route table over shared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/api/conversations",
            post(handlers::start_conversation).get(handlers::list_conversations),
        )
        .route("/api/conversations/{id}", get(handlers::get_conversation))
        .route(
            "/api/conversations/{id}/messages",
            get(handlers::list_messages).post(handlers::post_message),
        )
        .route(
            "/api/conversations/{id}/close",
            post(handlers::close_conversation),
        )
        .route(
            "/api/conversations/{id}/rating",
            post(handlers::rate_conversation),
        )
        .route(
            "/api/conversations/{id}/assign",
            post(handlers::assign_conversation),
        )
        .route(
            "/api/conversations/{id}/requeue",
            post(handlers::requeue_conversation),
        )
        .route(
            "/api/roles",
            post(handlers::create_role).get(handlers::list_roles),
        )
        .route(
            "/api/agents",
            post(handlers::create_agent).get(handlers::list_agents),
        )
        .route(
            "/api/agents/{id}/availability",
            put(handlers::set_availability),
        )
        .route("/api/dashboard/stats", get(handlers::dashboard_stats))
        .route("/api/events", get(handlers::events))
        .with_state(state)
}

/// Serve the API on `config.http_port` until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Config` if the port cannot be bound.
pub async fn serve_http(state: Arc<AppState>, ct: CancellationToken) -> Result<()> {
    let bind = SocketAddr::from(([127, 0, 0, 1], state.config.http_port));
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind HTTP on {bind}: {err}")))?;
    serve_listener(listener, state, ct).await
}

/// Serve the API on an already bound listener until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Io` if the server fails.
pub async fn serve_listener(
    listener: TcpListener,
    state: Arc<AppState>,
    ct: CancellationToken,
) -> Result<()> {
    let addr = listener
        .local_addr()
        .map_err(|err| AppError::Io(format!("listener has no address: {err}")))?;
    info!(%addr, "HTTP API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Io(format!("HTTP server error: {err}")))?;

    info!("HTTP API shut down");
    Ok(())
}
