//! Local IPC server for `livechat-ctl` commands.
//!
//! Listens on a named pipe (Windows) or Unix domain socket (Linux/macOS)
//! using the `interprocess` crate and answers line-delimited JSON.
//!
//! ## Protocol
//!
//! Request (one JSON object per line):
//! ```json
//! {"command": "stats"}
//! {"command": "waiting"}
//! {"command": "agents"}
//! {"command": "availability", "id": "agent:...", "status": "online", "available": true}
//! {"command": "close", "id": "...", "rating": 5}
//! {"command": "requeue", "id": "..."}
//! {"command": "sweep"}
//! ```
//!
//! Response (one JSON object per line):
//! ```json
//! {"ok": true, "data": { ... } }
//! {"ok": false, "error": "not found: ..."}
//! ```

use std::sync::Arc;

use interprocess::local_socket::{tokio::prelude::*, GenericNamespaced, ListenerOptions};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::models::agent::AgentStatus;
use crate::models::conversation::ConversationStatus;
use crate::state::AppState;
use crate::{AppError, Result};

/// Inbound IPC request from `livechat-ctl`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct IpcRequest {
    /// Command verb.
    pub command: String,
    /// Conversation or agent identifier.
    pub id: Option<String>,
    /// Agent presence for `availability`.
    pub status: Option<String>,
    /// Agent availability flag for `availability`.
    pub available: Option<bool>,
    /// Optional rating for `close`.
    pub rating: Option<u8>,
    /// Shared-secret authentication token.
    pub auth_token: Option<String>,
}

/// Outbound IPC response to `livechat-ctl`.
#[derive(Debug, Serialize, PartialEq)]
pub struct IpcResponse {
    /// Whether the command succeeded.
    pub ok: bool,
    /// Payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Error message on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IpcResponse {
    fn success(data: serde_json::Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }

    fn from_result<T: Serialize>(result: Result<T>) -> Self {
        match result.and_then(|value| Ok(serde_json::to_value(value)?)) {
            Ok(data) => Self::success(data),
            Err(err) => Self::error(err.to_string()),
        }
    }
}

/// Spawn the IPC server task.
///
/// # Errors
///
/// Returns `AppError::Ipc` if the listener cannot be created.
pub fn spawn_ipc_server(
    state: Arc<AppState>,
    ct: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>> {
    let name = state.config.ipc_name.clone();

    let listener_name = name
        .clone()
        .to_ns_name::<GenericNamespaced>()
        .map_err(|err| AppError::Ipc(format!("invalid ipc socket name '{name}': {err}")))?;

    let listener = ListenerOptions::new()
        .name(listener_name)
        .create_tokio()
        .map_err(|err| AppError::Ipc(format!("failed to create ipc listener: {err}")))?;

    info!(ipc_name = %name, "IPC server listening");

    let handle = tokio::spawn(
        async move {
            loop {
                tokio::select! {
                    () = ct.cancelled() => {
                        info!("IPC server shutting down");
                        break;
                    }
                    accepted = listener.accept() => {
                        match accepted {
                            Ok(stream) => {
                                tokio::spawn(handle_connection(stream, Arc::clone(&state)));
                            }
                            Err(err) => warn!(%err, "IPC accept failed"),
                        }
                    }
                }
            }
        }
        .instrument(info_span!("ipc_server", name = %name)),
    );

    Ok(handle)
}

async fn handle_connection(stream: interprocess::local_socket::tokio::Stream, state: Arc<AppState>) {
    async move {
        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    let response = match serde_json::from_str::<IpcRequest>(trimmed) {
                        Ok(request) => dispatch_command(&request, &state).await,
                        Err(err) => IpcResponse::error(format!("invalid json: {err}")),
                    };

                    let mut out = serde_json::to_string(&response).unwrap_or_else(|_| {
                        r#"{"ok":false,"error":"serialization failed"}"#.to_owned()
                    });
                    out.push('\n');

                    if let Err(err) = writer.write_all(out.as_bytes()).await {
                        warn!(%err, "failed to write ipc response");
                        break;
                    }
                }
                Err(err) => {
                    warn!(%err, "ipc read error");
                    break;
                }
            }
        }

        debug!("IPC connection closed");
    }
    .instrument(info_span!("ipc_conn"))
    .await;
}

/// Route an IPC command to the lifecycle or metrics.
pub async fn dispatch_command(request: &IpcRequest, state: &AppState) -> IpcResponse {
    if let Some(ref expected) = state.config.ipc_auth_token {
        match request.auth_token {
            Some(ref provided) if provided == expected => {}
            _ => {
                warn!(command = %request.command, "IPC request rejected: invalid auth token");
                return IpcResponse::error("unauthorized");
            }
        }
    }

    let lifecycle = &state.lifecycle;
    let response = match request.command.as_str() {
        "stats" => IpcResponse::from_result(state.metrics.dashboard_stats().await),
        "waiting" => IpcResponse::from_result(
            lifecycle
                .conversations(&[ConversationStatus::Waiting])
                .await,
        ),
        "agents" => IpcResponse::from_result(lifecycle.registry().agents().await),
        "availability" => match availability_args(request) {
            Ok((id, status, available)) => IpcResponse::from_result(
                lifecycle
                    .set_agent_availability(id, status, available)
                    .await,
            ),
            Err(err) => IpcResponse::error(err.to_string()),
        },
        "close" => match required_id(request) {
            Ok(id) => IpcResponse::from_result(lifecycle.close(id, request.rating).await),
            Err(err) => IpcResponse::error(err.to_string()),
        },
        "requeue" => match required_id(request) {
            Ok(id) => IpcResponse::from_result(lifecycle.requeue(id).await),
            Err(err) => IpcResponse::error(err.to_string()),
        },
        "sweep" => IpcResponse::from_result(lifecycle.run_assignment_pass().await),
        other => IpcResponse::error(format!("unknown command: {other}")),
    };

    info!(command = %request.command, ok = response.ok, "ipc command handled");
    response
}

fn required_id(request: &IpcRequest) -> Result<&str> {
    request
        .id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::InvalidInput("missing required 'id' field".into()))
}

fn availability_args(request: &IpcRequest) -> Result<(&str, AgentStatus, bool)> {
    let id = required_id(request)?;
    let status: AgentStatus = request
        .status
        .as_deref()
        .ok_or_else(|| AppError::InvalidInput("missing required 'status' field".into()))?
        .parse()?;
    let available = request.available.unwrap_or(status == AgentStatus::Online);
    Ok((id, status, available))
}
