//! Command dispatch handlers.

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{DispatchRequest, DispatchResponse, WaitParams};
use crate::app_state::AppState;
use crate::domain::{CommandId, CommandQueueEntry, CommandType};
use crate::error::{ConsoleError, ErrorResponse};
use crate::service::CommandHandle;

/// `POST /commands`: Enqueue a command for the worker.
///
/// # Errors
///
/// Returns [`ConsoleError::InvalidCommand`] on a bad type or payload,
/// [`ConsoleError::CommandNotSent`] when the queue write fails, or
/// [`ConsoleError::Timeout`] when `wait_secs` elapses first.
#[utoipa::path(
    post,
    path = "/api/v1/commands",
    tag = "Commands",
    summary = "Dispatch a command",
    description = "Appends one pending entry to the command queue. Without `wait_secs` the call returns 202 immediately; with it, the call returns 200 once the worker marks the entry completed or failed.",
    request_body = DispatchRequest,
    params(WaitParams),
    responses(
        (status = 200, description = "Worker finished the command", body = CommandQueueEntry),
        (status = 202, description = "Command queued", body = DispatchResponse),
        (status = 400, description = "Invalid command", body = ErrorResponse),
        (status = 503, description = "Command not sent", body = ErrorResponse),
        (status = 504, description = "No outcome in time", body = ErrorResponse),
    )
)]
pub async fn dispatch(
    State(state): State<AppState>,
    Query(wait): Query<WaitParams>,
    Json(req): Json<DispatchRequest>,
) -> Result<impl IntoResponse, ConsoleError> {
    let handle = state
        .console
        .dispatch(CommandType::from(req.command_type), req.payload)
        .await?;
    respond(handle, &wait).await
}

/// `POST /sessions/{guild_id}/{action}`: Pause, resume, skip or stop.
///
/// # Errors
///
/// Same as [`dispatch`]; unknown actions are [`ConsoleError::InvalidCommand`].
#[utoipa::path(
    post,
    path = "/api/v1/sessions/{guild_id}/{action}",
    tag = "Commands",
    summary = "Control a session",
    params(
        ("guild_id" = String, Path, description = "Guild whose session to control"),
        ("action" = String, Path, description = "`pause`, `resume`, `skip` or `stop`"),
        WaitParams,
    ),
    responses(
        (status = 200, description = "Worker finished the command", body = CommandQueueEntry),
        (status = 202, description = "Command queued", body = DispatchResponse),
        (status = 400, description = "Unknown action", body = ErrorResponse),
        (status = 503, description = "Command not sent", body = ErrorResponse),
    )
)]
pub async fn control_session(
    State(state): State<AppState>,
    Path((guild_id, action)): Path<(String, String)>,
    Query(wait): Query<WaitParams>,
) -> Result<impl IntoResponse, ConsoleError> {
    let handle = state
        .console
        .control_session(&guild_id, CommandType::from(action))
        .await?;
    respond(handle, &wait).await
}

/// `GET /commands/{id}`: Current state of a command.
///
/// # Errors
///
/// Returns [`ConsoleError::InvalidRequest`] for a malformed id and
/// [`ConsoleError::NotFound`] for an unknown one.
#[utoipa::path(
    get,
    path = "/api/v1/commands/{id}",
    tag = "Commands",
    summary = "Get a command",
    params(("id" = String, Path, description = "Command UUID")),
    responses(
        (status = 200, description = "Reconciled entry", body = CommandQueueEntry),
        (status = 400, description = "Malformed id", body = ErrorResponse),
        (status = 404, description = "Unknown command", body = ErrorResponse),
    )
)]
pub async fn get_command(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CommandQueueEntry>, ConsoleError> {
    let id: CommandId = id
        .parse()
        .map_err(|_| ConsoleError::InvalidRequest(format!("malformed command id: {id}")))?;
    Ok(Json(state.console.command(id).await?))
}

async fn respond(handle: CommandHandle, wait: &WaitParams) -> Result<axum::response::Response, ConsoleError> {
    if let Some(secs) = wait.clamped() {
        let entry = handle.wait_for_outcome(Duration::from_secs(secs)).await?;
        return Ok((StatusCode::OK, Json(entry)).into_response());
    }
    let response = DispatchResponse {
        command_id: handle.id(),
        entry: handle.entry().clone(),
    };
    Ok((StatusCode::ACCEPTED, Json(response)).into_response())
}

/// Command routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/commands", post(dispatch))
        .route("/commands/{id}", get(get_command))
        .route("/sessions/{guild_id}/{action}", post(control_session))
}
