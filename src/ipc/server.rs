//! Local IPC server for `procwarden-ctl` commands.
//!
//! Listens on a named pipe (Windows) or Unix domain socket (Linux/macOS)
//! using the `interprocess` crate. Accepts line-delimited JSON commands
//! and routes them to the controller or the process registry.
//!
//! ## Protocol
//!
//! Request (one JSON object per line):
//! ```json
//! {"command": "say", "phrase": "restart mirror", "auth_token": "..."}
//! {"command": "say", "phrase": "shut down", "confirm": true, "auth_token": "..."}
//! {"command": "list", "auth_token": "..."}
//! {"command": "pending", "auth_token": "..."}
//! {"command": "stop", "name": "mirror", "auth_token": "..."}
//! {"command": "restart", "name": "mirror", "auth_token": "..."}
//! ```
//!
//! Response (one JSON object per line):
//! ```json
//! {"ok": true, "data": { ... } }
//! {"ok": false, "error": "not found"}
//! ```

use std::sync::Arc;

use interprocess::local_socket::{tokio::prelude::*, GenericNamespaced, ListenerOptions};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::context::Channel;
use crate::dispatch::{Controller, Directive};
use crate::orchestrator::registry::ProcessRegistry;
use crate::orchestrator::restart::RestartRequest;
use crate::speech::ScriptedConversation;
use crate::{AppError, Result};

/// Shared state behind the IPC server.
pub struct IpcState {
    /// Routes `say` phrases.
    pub controller: Arc<Controller>,
    /// Answers `list` and `stop`.
    pub registry: Arc<ProcessRegistry>,
    /// Token every request must carry, when set.
    pub auth_token: Option<String>,
    /// Reply fed to confirmation prompts when a `say` carries `confirm`.
    pub affirmative: String,
    /// Cancelled when a command asks the controller to terminate.
    pub terminate: CancellationToken,
}

/// Inbound IPC request from `procwarden-ctl`.
#[derive(Debug, Deserialize)]
pub struct IpcRequest {
    /// Command verb.
    pub command: String,
    /// Phrase for `say`.
    pub phrase: Option<String>,
    /// Pre-confirm destructive actions requested by `say`.
    #[serde(default)]
    pub confirm: bool,
    /// Process name for `stop` and `restart`.
    pub name: Option<String>,
    /// Shared-secret authentication token.
    pub auth_token: Option<String>,
}

/// Outbound IPC response to `procwarden-ctl`.
#[derive(Debug, Serialize)]
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
}

/// Spawn the IPC server task.
///
/// # Errors
///
/// Returns `AppError::Ipc` if the listener cannot be created.
pub fn spawn_ipc_server(
    name: String,
    state: Arc<IpcState>,
    ct: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>> {
    let listener_name = name
        .clone()
        .to_ns_name::<GenericNamespaced>()
        .map_err(|err| AppError::Ipc(format!("invalid ipc socket name '{name}': {err}")))?;

    let listener = ListenerOptions::new()
        .name(listener_name)
        .create_tokio()
        .map_err(|err| AppError::Ipc(format!("failed to create ipc listener: {err}")))?;

    info!(ipc_name = %name, "IPC server listening");

    let handle = tokio::spawn(async move {
        let span = info_span!("ipc_server", name = %name);
        async move {
            loop {
                tokio::select! {
                    () = ct.cancelled() => {
                        info!("IPC server shutting down");
                        break;
                    }
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok(stream) => {
                                let state = Arc::clone(&state);
                                tokio::spawn(handle_connection(stream, state));
                            }
                            Err(err) => {
                                warn!(%err, "IPC accept failed");
                            }
                        }
                    }
                }
            }
        }
        .instrument(span)
        .await;
    });

    Ok(handle)
}

async fn handle_connection(stream: interprocess::local_socket::tokio::Stream, state: Arc<IpcState>) {
    let span = info_span!("ipc_conn");
    async move {
        let (reader, mut writer) = stream.split();
        let mut buf_reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            match buf_reader.read_line(&mut line).await {
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

                    let mut response_line = serde_json::to_string(&response).unwrap_or_else(|_| {
                        r#"{"ok":false,"error":"serialization failed"}"#.to_owned()
                    });
                    response_line.push('\n');

                    if let Err(err) = writer.write_all(response_line.as_bytes()).await {
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

        info!("IPC connection closed");
    }
    .instrument(span)
    .await;
}

/// Route an IPC command to the appropriate handler.
pub async fn dispatch_command(request: &IpcRequest, state: &IpcState) -> IpcResponse {
    let span = info_span!("ipc_command", command = %request.command);
    async move {
        if let Some(ref expected) = state.auth_token {
            match request.auth_token {
                Some(ref provided) if provided == expected => {}
                _ => {
                    warn!("IPC request rejected: invalid auth token");
                    return IpcResponse::error("unauthorized");
                }
            }
        }

        match request.command.as_str() {
            "say" => handle_say(request, state).await,
            "list" => handle_list(state),
            "pending" => handle_pending(state).await,
            "stop" => handle_stop(request, state),
            "restart" => handle_restart(request, state).await,
            other => IpcResponse::error(format!("unknown command: {other}")),
        }
    }
    .instrument(span)
    .await
}

async fn handle_say(request: &IpcRequest, state: &IpcState) -> IpcResponse {
    let Some(phrase) = request.phrase.as_deref().filter(|p| !p.trim().is_empty()) else {
        return IpcResponse::error("missing required 'phrase' field");
    };

    let replies: Vec<String> = if request.confirm {
        vec![state.affirmative.clone()]
    } else {
        Vec::new()
    };
    let conversation = ScriptedConversation::with_replies(replies);

    match state
        .controller
        .handle(phrase, Channel::Offline, &conversation)
        .await
    {
        Ok(directive) => {
            let terminate = directive == Directive::Terminate;
            if terminate {
                info!("termination requested over IPC");
                state.terminate.cancel();
            }
            IpcResponse::success(serde_json::json!({
                "spoken": conversation.spoken(),
                "terminate": terminate,
            }))
        }
        Err(err) => IpcResponse::error(format!("failed to handle phrase: {err}")),
    }
}

fn handle_list(state: &IpcState) -> IpcResponse {
    match state.registry.snapshot() {
        Ok(entries) => IpcResponse::success(serde_json::json!({ "processes": entries })),
        Err(err) => IpcResponse::error(format!("failed to list processes: {err}")),
    }
}

async fn handle_pending(state: &IpcState) -> IpcResponse {
    match state.controller.restarts().pending().await {
        Ok(records) => IpcResponse::success(serde_json::json!({ "restarts": records })),
        Err(err) => IpcResponse::error(format!("failed to list pending restarts: {err}")),
    }
}

fn handle_stop(request: &IpcRequest, state: &IpcState) -> IpcResponse {
    let Some(ref name) = request.name else {
        return IpcResponse::error("missing required 'name' field");
    };
    match state.registry.stop(name) {
        Ok(()) => IpcResponse::success(serde_json::json!({ "name": name, "status": "stopped" })),
        Err(err) => IpcResponse::error(format!("failed to stop '{name}': {err}")),
    }
}

async fn handle_restart(request: &IpcRequest, state: &IpcState) -> IpcResponse {
    let Some(ref name) = request.name else {
        return IpcResponse::error("missing required 'name' field");
    };
    let silent = ScriptedConversation::with_replies(Vec::<String>::new());
    match state
        .controller
        .restarts()
        .request(RestartRequest::Quiet { caller: name }, &silent)
        .await
    {
        Ok(_) => IpcResponse::success(serde_json::json!({ "caller": name, "status": "recorded" })),
        Err(err) => IpcResponse::error(format!("failed to record restart for '{name}': {err}")),
    }
}
