//! axum router, handlers and server bootstrap for the locker control surface.

use std::convert::Infallible;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::StreamExt;
use namelock_runtime::{
    CredentialSaveSource, CredentialStoreError, LogEntry, NameLockContext, NameLockStatus,
    RunState, StartError, StartOutcome,
};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, warn};

mod panel_page;
mod types;

use panel_page::render_control_panel_page;
use types::{ApiEnvelope, ControlApiError, SaveTextRequest, StartRequest};

pub const CONTROL_PANEL_ENDPOINT: &str = "/";
pub const UPLOAD_ENDPOINT: &str = "/upload";
pub const SAVE_TEXT_ENDPOINT: &str = "/save-text";
pub const DELETE_CREDENTIAL_ENDPOINT: &str = "/delete-appstate";
pub const START_ENDPOINT: &str = "/start";
pub const STOP_ENDPOINT: &str = "/stop";
pub const STATUS_ENDPOINT: &str = "/_status";
pub const EVENTS_ENDPOINT: &str = "/events";

const UPLOAD_FIELD_NAME: &str = "appstate";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlServerConfig {
    /// `host:port` to listen on.
    pub bind: String,
}

pub struct ControlServerState {
    context: NameLockContext,
}

impl ControlServerState {
    pub fn new(context: NameLockContext) -> Self {
        Self { context }
    }
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    ok: bool,
    #[serde(flatten)]
    status: NameLockStatus,
}

pub async fn run_control_server(
    config: ControlServerConfig,
    context: NameLockContext,
) -> Result<()> {
    let listener = TcpListener::bind(config.bind.as_str())
        .await
        .with_context(|| format!("failed to bind control server on {}", config.bind))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bound control server address")?;
    info!(
        addr = %local_addr,
        credential_path = %context.config().credential_path.display(),
        "group locker control panel listening"
    );

    let state = Arc::new(ControlServerState::new(context.clone()));
    let app = build_control_router(state);
    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    info!("control server shutting down; stopping locker");
    context.shutdown().await;
    serve_result.context("control server exited unexpectedly")?;
    Ok(())
}

pub fn build_control_router(state: Arc<ControlServerState>) -> Router {
    Router::new()
        .route(CONTROL_PANEL_ENDPOINT, get(handle_control_panel))
        .route(UPLOAD_ENDPOINT, post(handle_upload))
        .route(SAVE_TEXT_ENDPOINT, post(handle_save_text))
        .route(DELETE_CREDENTIAL_ENDPOINT, post(handle_delete_credential))
        .route(START_ENDPOINT, post(handle_start))
        .route(STOP_ENDPOINT, post(handle_stop))
        .route(STATUS_ENDPOINT, get(handle_status))
        .route(EVENTS_ENDPOINT, get(handle_events))
        .with_state(state)
}

async fn handle_control_panel() -> Html<String> {
    Html(render_control_panel_page())
}

async fn handle_upload(
    State(state): State<Arc<ControlServerState>>,
    mut multipart: Multipart,
) -> Response {
    let mut upload = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() != Some(UPLOAD_FIELD_NAME) {
                    continue;
                }
                match field.text().await {
                    Ok(text) => {
                        upload = Some(text);
                        break;
                    }
                    Err(error) => {
                        return ControlApiError::bad_request(format!(
                            "Upload failed: {error}"
                        ))
                        .into_response();
                    }
                }
            }
            Ok(None) => break,
            Err(error) => {
                return ControlApiError::bad_request(format!("Upload failed: {error}"))
                    .into_response();
            }
        }
    }

    let Some(text) = upload else {
        return ApiEnvelope::failure("No file uploaded").into_response();
    };
    match state
        .context
        .save_credential(&text, CredentialSaveSource::Upload)
    {
        Ok(()) => ApiEnvelope::success("appstate.json uploaded and saved.").into_response(),
        Err(error) => credential_save_failure("Upload failed", error).into_response(),
    }
}

async fn handle_save_text(State(state): State<Arc<ControlServerState>>, body: Bytes) -> Response {
    let request = match serde_json::from_slice::<SaveTextRequest>(&body) {
        Ok(request) => request,
        Err(error) => {
            return ControlApiError::bad_request(format!("failed to parse request body: {error}"))
                .into_response();
        }
    };
    let Some(text) = request.appstate_text() else {
        return ApiEnvelope::failure("No appstate content provided").into_response();
    };
    match state.context.save_credential(&text, CredentialSaveSource::Text) {
        Ok(()) => ApiEnvelope::success("appstate.json saved from text.").into_response(),
        Err(error) => credential_save_failure("Save failed", error).into_response(),
    }
}

fn credential_save_failure(prefix: &str, error: CredentialStoreError) -> ControlApiError {
    ControlApiError::internal(format!("{prefix}: {error}"))
}

async fn handle_delete_credential(State(state): State<Arc<ControlServerState>>) -> Response {
    match state.context.clear_credential() {
        Ok(_) => ApiEnvelope::success("Deleted appstate.json.").into_response(),
        Err(error) => ControlApiError::internal(format!("Delete failed: {error}")).into_response(),
    }
}

async fn handle_start(State(state): State<Arc<ControlServerState>>, body: Bytes) -> Response {
    let request = if body.is_empty() {
        StartRequest::default()
    } else {
        match serde_json::from_slice::<StartRequest>(&body) {
            Ok(request) => request,
            Err(error) => {
                return ControlApiError::bad_request(format!(
                    "failed to parse request body: {error}"
                ))
                .into_response();
            }
        }
    };

    let result = state
        .context
        .start(&request.group_id(), &request.locked_name())
        .await;
    match result {
        Ok(outcome @ (StartOutcome::Started | StartOutcome::AlreadyRunning)) => {
            ApiEnvelope::success(outcome.message()).into_response()
        }
        Ok(outcome @ StartOutcome::CancelledDuringLogin) => {
            ApiEnvelope::failure(outcome.message()).into_response()
        }
        Err(StartError::PreconditionFailed(message)) => {
            ApiEnvelope::failure(message).into_response()
        }
        Err(error @ StartError::Login(_)) => {
            ApiEnvelope::failure(error.to_string()).into_response()
        }
    }
}

async fn handle_stop(State(state): State<Arc<ControlServerState>>) -> Response {
    let outcome = state.context.stop();
    ApiEnvelope::success(outcome.message()).into_response()
}

async fn handle_status(State(state): State<Arc<ControlServerState>>) -> Response {
    (
        StatusCode::OK,
        Json(StatusResponse {
            ok: true,
            status: state.context.status(),
        }),
    )
        .into_response()
}

async fn handle_events(State(state): State<Arc<ControlServerState>>) -> Response {
    let (tx, rx) = mpsc::unbounded_channel::<Event>();
    tokio::spawn(run_event_stream_loop(state, tx));
    let stream = UnboundedReceiverStream::new(rx).map(Ok::<Event, Infallible>);
    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

fn snapshot_event(status: &NameLockStatus) -> Event {
    let payload = serde_json::to_value(status).unwrap_or(Value::Null);
    Event::default().event("snapshot").data(payload.to_string())
}

fn log_event(entry: &LogEntry) -> Event {
    Event::default()
        .event("log")
        .id(entry.sequence.to_string())
        .data(
            json!({
                "sequence": entry.sequence,
                "level": entry.level,
                "timestamp": entry.timestamp(),
                "message": entry.message,
                "line": entry.render(),
            })
            .to_string(),
        )
}

fn state_event(run_state: RunState) -> Event {
    Event::default()
        .event("state")
        .data(json!({ "state": run_state, "running": run_state == RunState::Running }).to_string())
}

/// Pushes a snapshot, then every new log entry and run-state change until the
/// client disconnects or the context goes away.
async fn run_event_stream_loop(state: Arc<ControlServerState>, tx: mpsc::UnboundedSender<Event>) {
    let mut logs = state.context.subscribe_logs();
    let mut states = state.context.subscribe_state();
    let _ = states.borrow_and_update();
    if tx.send(snapshot_event(&state.context.status())).is_err() {
        return;
    }

    loop {
        tokio::select! {
            received = logs.recv() => match received {
                Ok(entry) => {
                    if tx.send(log_event(&entry)).is_err() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event stream subscriber lagged behind activity log");
                    let notice = Event::default()
                        .event("lagged")
                        .data(json!({ "skipped": skipped }).to_string());
                    if tx.send(notice).is_err() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return,
            },
            changed = states.changed() => {
                if changed.is_err() {
                    return;
                }
                let run_state = *states.borrow_and_update();
                if tx.send(state_event(run_state)).is_err() {
                    return;
                }
            }
            _ = tx.closed() => return,
        }
    }
}
