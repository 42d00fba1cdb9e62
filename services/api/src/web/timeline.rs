//! services/api/src/web/timeline.rs
//!
//! Per-student timeline endpoints plus the cross-student activity feeds.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use crm_core::{
    domain::{
        EventKind, NewCommunication, NewEvent, NewInteraction, NewNote, NewReminder, NewTask,
        NotePatch,
    },
    CrmError,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::web::extract::{JsonBody, QueryParams};
use crate::web::rest::{reject, ErrorBody, HttpError};
use crate::web::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TimelineFilter {
    #[serde(default, rename = "type")]
    pub kind: Option<EventKind>,
}

async fn append<E: NewEvent + Sync>(
    state: &AppState,
    student_id: &str,
    event: &E,
) -> Result<impl IntoResponse, HttpError> {
    let created = state
        .timeline
        .append(student_id, event)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_kind(
    state: &AppState,
    student_id: &str,
    kind: EventKind,
) -> Result<impl IntoResponse, HttpError> {
    let events = state
        .timeline
        .list(student_id, Some(kind))
        .await
        .map_err(reject)?;
    Ok(Json(events))
}

//=========================================================================================
// Whole Timeline
//=========================================================================================

/// Every timeline entry of a student, newest first.
///
/// Includes entries embedded on legacy student records.
#[utoipa::path(
    get,
    path = "/api/students/{id}/timeline",
    params(
        ("id" = String, Path, description = "Student id."),
        ("type" = Option<String>, Query, description = "interaction, communication, note, task or reminder."),
    ),
    responses(
        (status = 200, description = "Timeline entries, newest first"),
        (status = 400, description = "Unknown type", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn list_timeline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    QueryParams(filter): QueryParams<TimelineFilter>,
) -> Result<impl IntoResponse, HttpError> {
    let events = state.timeline.list(&id, filter.kind).await.map_err(reject)?;
    Ok(Json(events))
}

//=========================================================================================
// Per-Kind Endpoints
//=========================================================================================

#[utoipa::path(
    get,
    path = "/api/students/{id}/interactions",
    params(("id" = String, Path, description = "Student id.")),
    responses((status = 200, description = "Interactions, newest first")),
    security(("bearer" = []))
)]
pub async fn list_interactions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    list_kind(&state, &id, EventKind::Interaction).await
}

#[utoipa::path(
    post,
    path = "/api/students/{id}/interactions",
    params(("id" = String, Path, description = "Student id.")),
    request_body(content_type = "application/json", description = "The interaction."),
    responses(
        (status = 201, description = "Interaction recorded"),
        (status = 404, description = "No such student", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn create_interaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(event): JsonBody<NewInteraction>,
) -> Result<impl IntoResponse, HttpError> {
    append(&state, &id, &event).await
}

#[utoipa::path(
    get,
    path = "/api/students/{id}/communications",
    params(("id" = String, Path, description = "Student id.")),
    responses((status = 200, description = "Communications, newest first")),
    security(("bearer" = []))
)]
pub async fn list_communications(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    list_kind(&state, &id, EventKind::Communication).await
}

#[utoipa::path(
    post,
    path = "/api/students/{id}/communications",
    params(("id" = String, Path, description = "Student id.")),
    request_body(content_type = "application/json", description = "The communication."),
    responses(
        (status = 201, description = "Communication recorded"),
        (status = 404, description = "No such student", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn create_communication(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(event): JsonBody<NewCommunication>,
) -> Result<impl IntoResponse, HttpError> {
    append(&state, &id, &event).await
}

#[utoipa::path(
    get,
    path = "/api/students/{id}/notes",
    params(("id" = String, Path, description = "Student id.")),
    responses((status = 200, description = "Notes, newest first")),
    security(("bearer" = []))
)]
pub async fn list_notes(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    list_kind(&state, &id, EventKind::Note).await
}

#[utoipa::path(
    post,
    path = "/api/students/{id}/notes",
    params(("id" = String, Path, description = "Student id.")),
    request_body(content_type = "application/json", description = "The note."),
    responses(
        (status = 201, description = "Note added"),
        (status = 404, description = "No such student", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn create_note(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(event): JsonBody<NewNote>,
) -> Result<impl IntoResponse, HttpError> {
    append(&state, &id, &event).await
}

#[utoipa::path(
    put,
    path = "/api/students/{id}/notes/{note_id}",
    params(
        ("id" = String, Path, description = "Student id."),
        ("note_id" = String, Path, description = "Note id."),
    ),
    request_body(content_type = "application/json", description = "title, content and/or is_private."),
    responses(
        (status = 200, description = "The updated note"),
        (status = 404, description = "No such note", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn update_note(
    State(state): State<Arc<AppState>>,
    Path((id, note_id)): Path<(String, String)>,
    JsonBody(patch): JsonBody<NotePatch>,
) -> Result<impl IntoResponse, HttpError> {
    let note = state
        .timeline
        .update_note(&id, &note_id, &patch)
        .await
        .map_err(reject)?;
    Ok(Json(note))
}

#[utoipa::path(
    delete,
    path = "/api/students/{id}/notes/{note_id}",
    params(
        ("id" = String, Path, description = "Student id."),
        ("note_id" = String, Path, description = "Note id."),
    ),
    responses(
        (status = 200, description = "Note deleted"),
        (status = 404, description = "No such note", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn delete_note(
    State(state): State<Arc<AppState>>,
    Path((id, note_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, HttpError> {
    if !state
        .timeline
        .delete_note(&id, &note_id)
        .await
        .map_err(reject)?
    {
        return Err(reject(CrmError::not_found("note", note_id)));
    }
    Ok(Json(json!({ "message": "Note deleted successfully" })))
}

#[utoipa::path(
    get,
    path = "/api/students/{id}/tasks",
    params(("id" = String, Path, description = "Student id.")),
    responses((status = 200, description = "Tasks, newest first")),
    security(("bearer" = []))
)]
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    list_kind(&state, &id, EventKind::Task).await
}

#[utoipa::path(
    post,
    path = "/api/students/{id}/tasks",
    params(("id" = String, Path, description = "Student id.")),
    request_body(content_type = "application/json", description = "The task."),
    responses(
        (status = 201, description = "Task added"),
        (status = 404, description = "No such student", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn create_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(event): JsonBody<NewTask>,
) -> Result<impl IntoResponse, HttpError> {
    append(&state, &id, &event).await
}

#[utoipa::path(
    get,
    path = "/api/students/{id}/reminders",
    params(("id" = String, Path, description = "Student id.")),
    responses((status = 200, description = "Reminders, newest first")),
    security(("bearer" = []))
)]
pub async fn list_reminders(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    list_kind(&state, &id, EventKind::Reminder).await
}

#[utoipa::path(
    post,
    path = "/api/students/{id}/reminders",
    params(("id" = String, Path, description = "Student id.")),
    request_body(content_type = "application/json", description = "The reminder."),
    responses(
        (status = 201, description = "Reminder added"),
        (status = 404, description = "No such student", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn create_reminder(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(event): JsonBody<NewReminder>,
) -> Result<impl IntoResponse, HttpError> {
    append(&state, &id, &event).await
}

//=========================================================================================
// Cross-Student Feeds
//=========================================================================================

#[utoipa::path(
    get,
    path = "/api/communications",
    responses((status = 200, description = "Every communication with its student, newest first")),
    security(("bearer" = []))
)]
pub async fn communications_feed(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    let feed = state.timeline.all_communications().await.map_err(reject)?;
    Ok(Json(feed))
}

#[utoipa::path(
    get,
    path = "/api/interactions",
    responses((status = 200, description = "Every interaction with its student, newest first")),
    security(("bearer" = []))
)]
pub async fn interactions_feed(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    let feed = state.timeline.all_interactions().await.map_err(reject)?;
    Ok(Json(feed))
}
