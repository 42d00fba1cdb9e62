//! services/api/src/web/students.rs
//!
//! Student profile endpoints: CRUD, search, validation, registration and
//! bulk import/export.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use crm_core::{
    directory::BulkImportRequest,
    domain::{NewStudent, StudentPatch},
    export::ExportFormat,
    query::{ListStudentsQuery, SearchRequest},
    CrmError,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::web::extract::{JsonBody, QueryParams};
use crate::web::rest::{reject, ErrorBody, HttpError};
use crate::web::state::AppState;

/// Body of a bulk export request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ExportRequest {
    /// `csv` or `json`.
    pub format: String,
    /// Optional list filters; paging is ignored.
    #[schema(value_type = Option<Object>)]
    #[serde(default)]
    pub filters: Option<ListStudentsQuery>,
}

#[utoipa::path(
    get,
    path = "/api/students",
    params(
        ("skip" = Option<usize>, Query, description = "Records to skip."),
        ("limit" = Option<usize>, Query, description = "Page size, 1 to 1000 (default 100)."),
        ("status" = Option<String>, Query, description = "Exact pipeline status."),
        ("country" = Option<String>, Query, description = "Exact country."),
        ("high_intent" = Option<bool>, Query),
        ("needs_essay_help" = Option<bool>, Query),
    ),
    responses(
        (status = 200, description = "Students in creation order"),
        (status = 400, description = "Invalid paging", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn list_students(
    State(state): State<Arc<AppState>>,
    QueryParams(query): QueryParams<ListStudentsQuery>,
) -> Result<impl IntoResponse, HttpError> {
    let students = state.directory.list(&query).await.map_err(reject)?;
    Ok(Json(students))
}

#[utoipa::path(
    post,
    path = "/api/students",
    request_body(content_type = "application/json", description = "The new student profile."),
    responses(
        (status = 201, description = "Student created"),
        (status = 400, description = "Invalid profile or duplicate email", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn create_student(
    State(state): State<Arc<AppState>>,
    JsonBody(new): JsonBody<NewStudent>,
) -> Result<impl IntoResponse, HttpError> {
    let student = state.directory.create(&new).await.map_err(reject)?;
    Ok((StatusCode::CREATED, Json(student)))
}

#[utoipa::path(
    get,
    path = "/api/students/{id}",
    params(("id" = String, Path, description = "Student id.")),
    responses(
        (status = 200, description = "The student"),
        (status = 404, description = "No such student", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn get_student(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    let student = state.directory.require(&id).await.map_err(reject)?;
    Ok(Json(student))
}

/// Partially update a student. Identity fields (name, email, country, phone,
/// grade, source) cannot be changed.
#[utoipa::path(
    put,
    path = "/api/students/{id}",
    params(("id" = String, Path, description = "Student id.")),
    request_body(content_type = "application/json", description = "Fields to change."),
    responses(
        (status = 200, description = "The updated student"),
        (status = 400, description = "Immutable or invalid field", body = ErrorBody),
        (status = 404, description = "No such student", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn update_student(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(raw): JsonBody<Map<String, Value>>,
) -> Result<impl IntoResponse, HttpError> {
    let patch = StudentPatch::try_from(raw).map_err(reject)?;
    let student = state.directory.update(&id, &patch).await.map_err(reject)?;
    Ok(Json(student))
}

#[utoipa::path(
    delete,
    path = "/api/students/{id}",
    params(("id" = String, Path, description = "Student id.")),
    responses(
        (status = 200, description = "Student and timeline deleted"),
        (status = 404, description = "No such student", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn delete_student(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    if !state.directory.delete(&id).await.map_err(reject)? {
        return Err(reject(CrmError::not_found("student", id)));
    }
    Ok(Json(json!({ "message": "Student deleted successfully" })))
}

#[utoipa::path(
    post,
    path = "/api/students/search",
    request_body(content_type = "application/json", description = "Search text, filters and paging."),
    responses(
        (status = 200, description = "One page of matches"),
        (status = 400, description = "Invalid search request", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn search_students(
    State(state): State<Arc<AppState>>,
    JsonBody(request): JsonBody<SearchRequest>,
) -> Result<impl IntoResponse, HttpError> {
    let page = state.directory.search(&request).await.map_err(reject)?;
    Ok(Json(page))
}

/// Check a profile without creating it.
#[utoipa::path(
    post,
    path = "/api/students/validate",
    request_body(content_type = "application/json", description = "The candidate profile."),
    responses((status = 200, description = "Validation report with errors and warnings")),
    security(("bearer" = []))
)]
pub async fn validate_student(
    State(state): State<Arc<AppState>>,
    JsonBody(new): JsonBody<NewStudent>,
) -> Result<impl IntoResponse, HttpError> {
    Ok(Json(state.directory.validate(&new).await))
}

#[utoipa::path(
    post,
    path = "/api/students/register",
    request_body(content_type = "application/json", description = "The new student profile."),
    responses(
        (status = 200, description = "Registration receipt"),
        (status = 400, description = "Invalid profile or duplicate email", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn register_student(
    State(state): State<Arc<AppState>>,
    JsonBody(new): JsonBody<NewStudent>,
) -> Result<impl IntoResponse, HttpError> {
    let registration = state.directory.register(&new).await.map_err(reject)?;
    Ok(Json(registration))
}

/// Import a batch of students. Invalid rows and duplicates are skipped and
/// reported; with `validate_only` nothing is written.
#[utoipa::path(
    post,
    path = "/api/students/bulk/import",
    request_body(content_type = "application/json", description = "Students and the validate_only flag."),
    responses((status = 200, description = "Per-row import outcome")),
    security(("bearer" = []))
)]
pub async fn bulk_import(
    State(state): State<Arc<AppState>>,
    JsonBody(request): JsonBody<BulkImportRequest>,
) -> Result<impl IntoResponse, HttpError> {
    Ok(Json(state.directory.bulk_import(&request).await))
}

#[utoipa::path(
    post,
    path = "/api/students/bulk/export",
    request_body = ExportRequest,
    responses(
        (status = 200, description = "File contents, content type and file name"),
        (status = 400, description = "Unknown format", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn bulk_export(
    State(state): State<Arc<AppState>>,
    JsonBody(request): JsonBody<ExportRequest>,
) -> Result<impl IntoResponse, HttpError> {
    let format: ExportFormat = request.format.parse().map_err(reject)?;
    let payload = state
        .directory
        .export(format, request.filters.as_ref())
        .await
        .map_err(reject)?;
    Ok(Json(payload))
}
