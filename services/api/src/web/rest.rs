//! services/api/src/web/rest.rs
//!
//! The master definition for the OpenAPI specification, the shared error
//! payload every handler answers with, and the health check.

use crate::web::state::AppState;
use crate::web::{auth, board, email, insights, students, timeline};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::Utc;
use crm_core::CrmError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error};
use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi, ToSchema,
};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        auth::current_user,
        auth::verify_token,
        students::list_students,
        students::create_student,
        students::get_student,
        students::update_student,
        students::delete_student,
        students::search_students,
        students::validate_student,
        students::register_student,
        students::bulk_import,
        students::bulk_export,
        timeline::list_timeline,
        timeline::list_interactions,
        timeline::create_interaction,
        timeline::list_communications,
        timeline::create_communication,
        timeline::list_notes,
        timeline::create_note,
        timeline::update_note,
        timeline::delete_note,
        timeline::list_tasks,
        timeline::create_task,
        timeline::list_reminders,
        timeline::create_reminder,
        timeline::communications_feed,
        timeline::interactions_feed,
        board::list_board_tasks,
        board::create_board_task,
        board::update_board_task,
        board::delete_board_task,
        board::list_board_reminders,
        board::create_board_reminder,
        board::update_board_reminder,
        board::delete_board_reminder,
        insights::dashboard_stats,
        insights::student_analytics,
        insights::student_summary,
        email::send_email,
        email::send_test_email,
    ),
    components(
        schemas(ErrorBody, students::ExportRequest)
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Student CRM API", description = "Student records, timelines and admissions pipeline insights.")
    )
)]
pub struct ApiDoc;

/// Registers the `bearer` security scheme referenced by the protected routes.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

//=========================================================================================
// Error Payload
//=========================================================================================

/// The body of every error response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Machine-readable category, e.g. `not_found` or `validation_error`.
    pub error: String,
    pub detail: String,
}

pub type HttpError = (StatusCode, Json<ErrorBody>);

pub fn error_response(status: StatusCode, error: &str, detail: impl Into<String>) -> HttpError {
    (
        status,
        Json(ErrorBody {
            error: error.to_string(),
            detail: detail.into(),
        }),
    )
}

pub fn status_for(e: &CrmError) -> StatusCode {
    match e {
        CrmError::NotFound { .. } => StatusCode::NOT_FOUND,
        CrmError::DuplicateEmail(_) | CrmError::Validation(_) => StatusCode::BAD_REQUEST,
        CrmError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        CrmError::MissingRequiredField { .. }
        | CrmError::UpstreamUnavailable(_)
        | CrmError::Encoding(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Maps a service error to its response, logging server-side failures.
pub fn reject(e: CrmError) -> HttpError {
    let status = status_for(&e);
    if status.is_server_error() {
        error!(kind = e.kind(), "Request failed: {}", e);
    } else {
        debug!(kind = e.kind(), "Request rejected: {}", e);
    }
    error_response(status, e.kind(), e.to_string())
}

//=========================================================================================
// Health
//=========================================================================================

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "The service is up"))
)]
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "store": format!("{:?}", state.config.store_backend).to_lowercase(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
