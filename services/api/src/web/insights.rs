//! services/api/src/web/insights.rs
//!
//! Dashboard, analytics and per-student summary endpoints.

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json},
};
use crm_core::query::AnalyticsRequest;
use std::sync::Arc;

use crate::web::extract::JsonBody;
use crate::web::rest::{reject, ErrorBody, HttpError};
use crate::web::state::AppState;

#[utoipa::path(
    get,
    path = "/api/dashboard/stats",
    responses(
        (status = 200, description = "Headline counts, breakdowns and 30-day changes"),
        (status = 500, description = "Store unavailable", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn dashboard_stats(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    let stats = state.insights.dashboard().await.map_err(reject)?;
    Ok(Json(stats))
}

#[utoipa::path(
    post,
    path = "/api/students/analytics",
    request_body(content_type = "application/json", description = "date_range_days (1-365) and section toggles."),
    responses(
        (status = 200, description = "Analytics report"),
        (status = 400, description = "Invalid date range", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn student_analytics(
    State(state): State<Arc<AppState>>,
    JsonBody(request): JsonBody<AnalyticsRequest>,
) -> Result<impl IntoResponse, HttpError> {
    let report = state.insights.analytics(&request).await.map_err(reject)?;
    Ok(Json(report))
}

/// Summarize a student's profile and recent activity.
///
/// Uses the configured LLM when available and answers with a deterministic
/// template otherwise, or when the LLM fails or is too slow.
#[utoipa::path(
    get,
    path = "/api/students/{id}/summary",
    params(("id" = String, Path, description = "Student id.")),
    responses(
        (status = 200, description = "Summary text and whether it came from the LLM or the template"),
        (status = 404, description = "No such student", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn student_summary(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    let summary = state
        .insights
        .student_summary(&id, state.summarizer.as_deref())
        .await
        .map_err(reject)?;
    Ok(Json(summary))
}
