//! services/api/src/web/board.rs
//!
//! The standalone task and reminder board.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use crm_core::{
    domain::{EventKind, NewReminder, NewTask, ReminderPatch, TaskPatch},
    CrmError,
};
use serde_json::json;
use std::sync::Arc;

use crate::web::extract::JsonBody;
use crate::web::rest::{reject, ErrorBody, HttpError};
use crate::web::state::AppState;

async fn list(state: &AppState, kind: EventKind) -> Result<impl IntoResponse, HttpError> {
    let entries = state.timeline.list_board(kind).await.map_err(reject)?;
    Ok(Json(entries))
}

async fn delete(state: &AppState, kind: EventKind, id: String) -> Result<impl IntoResponse, HttpError> {
    if !state.timeline.delete_board(kind, &id).await.map_err(reject)? {
        return Err(reject(CrmError::not_found(kind.as_str(), id)));
    }
    let message = match kind {
        EventKind::Reminder => "Reminder deleted successfully",
        _ => "Task deleted successfully",
    };
    Ok(Json(json!({ "message": message })))
}

//=========================================================================================
// Tasks
//=========================================================================================

#[utoipa::path(
    get,
    path = "/api/tasks",
    responses((status = 200, description = "Every task on the board, newest first")),
    security(("bearer" = []))
)]
pub async fn list_board_tasks(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    list(&state, EventKind::Task).await
}

/// Create a task. It may name the student it concerns via `student_id`.
#[utoipa::path(
    post,
    path = "/api/tasks",
    request_body(content_type = "application/json", description = "The task."),
    responses(
        (status = 201, description = "Task created"),
        (status = 400, description = "Invalid task", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn create_board_task(
    State(state): State<Arc<AppState>>,
    JsonBody(task): JsonBody<NewTask>,
) -> Result<impl IntoResponse, HttpError> {
    let created = state.timeline.create_board_task(&task).await.map_err(reject)?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    put,
    path = "/api/tasks/{id}",
    params(("id" = String, Path, description = "Task id.")),
    request_body(content_type = "application/json", description = "Fields to change."),
    responses(
        (status = 200, description = "The updated task"),
        (status = 404, description = "No such task", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn update_board_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<TaskPatch>,
) -> Result<impl IntoResponse, HttpError> {
    let task = state.timeline.update_board(&id, &patch).await.map_err(reject)?;
    Ok(Json(task))
}

#[utoipa::path(
    delete,
    path = "/api/tasks/{id}",
    params(("id" = String, Path, description = "Task id.")),
    responses(
        (status = 200, description = "Task deleted"),
        (status = 404, description = "No such task", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn delete_board_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    delete(&state, EventKind::Task, id).await
}

//=========================================================================================
// Reminders
//=========================================================================================

#[utoipa::path(
    get,
    path = "/api/reminders",
    responses((status = 200, description = "Every reminder on the board, newest first")),
    security(("bearer" = []))
)]
pub async fn list_board_reminders(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    list(&state, EventKind::Reminder).await
}

#[utoipa::path(
    post,
    path = "/api/reminders",
    request_body(content_type = "application/json", description = "The reminder."),
    responses(
        (status = 201, description = "Reminder created"),
        (status = 400, description = "Invalid reminder", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn create_board_reminder(
    State(state): State<Arc<AppState>>,
    JsonBody(reminder): JsonBody<NewReminder>,
) -> Result<impl IntoResponse, HttpError> {
    let created = state
        .timeline
        .create_board_reminder(&reminder)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    put,
    path = "/api/reminders/{id}",
    params(("id" = String, Path, description = "Reminder id.")),
    request_body(content_type = "application/json", description = "Fields to change."),
    responses(
        (status = 200, description = "The updated reminder"),
        (status = 404, description = "No such reminder", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn update_board_reminder(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<ReminderPatch>,
) -> Result<impl IntoResponse, HttpError> {
    let reminder = state.timeline.update_board(&id, &patch).await.map_err(reject)?;
    Ok(Json(reminder))
}

#[utoipa::path(
    delete,
    path = "/api/reminders/{id}",
    params(("id" = String, Path, description = "Reminder id.")),
    responses(
        (status = 200, description = "Reminder deleted"),
        (status = 404, description = "No such reminder", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn delete_board_reminder(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    delete(&state, EventKind::Reminder, id).await
}
