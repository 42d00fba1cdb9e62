//! services/api/src/web/email.rs
//!
//! Outbound email endpoints.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use crm_core::{ports::OutboundEmail, CrmError};
use std::sync::Arc;
use tracing::{info, warn};

use crate::web::extract::JsonBody;
use crate::web::rest::{error_response, reject, ErrorBody, HttpError};
use crate::web::state::AppState;

async fn deliver(state: &AppState, email: &OutboundEmail) -> Result<impl IntoResponse, HttpError> {
    let receipt = state
        .email
        .send(email)
        .await
        .map_err(|e| reject(CrmError::from(e)))?;
    if receipt.success {
        info!(to = %email.to, "email delivered to transport");
    } else {
        warn!(to = %email.to, error = ?receipt.error, "email not sent");
    }
    Ok(Json(receipt))
}

/// Send an email. Transport rejections come back as `success: false` with
/// the reason; only a transport timeout is an error status.
#[utoipa::path(
    post,
    path = "/api/email/send",
    request_body(content_type = "application/json", description = "to, subject, html and optional from_name."),
    responses(
        (status = 200, description = "Send receipt"),
        (status = 400, description = "Missing recipient or subject", body = ErrorBody),
        (status = 504, description = "Email transport timed out", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn send_email(
    State(state): State<Arc<AppState>>,
    JsonBody(email): JsonBody<OutboundEmail>,
) -> Result<impl IntoResponse, HttpError> {
    if !email.to.contains('@') {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "validation_error",
            format!("'{}' is not an email address", email.to),
        ));
    }
    if email.subject.trim().is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "subject must not be empty",
        ));
    }
    deliver(&state, &email).await
}

#[utoipa::path(
    post,
    path = "/api/email/test",
    responses(
        (status = 200, description = "Receipt for a fixed test email"),
        (status = 504, description = "Email transport timed out", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn send_test_email(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    let email = OutboundEmail {
        to: "test@example.com".to_string(),
        subject: "Test Email".to_string(),
        html: "<p>This is a test email from the CRM system.</p>".to_string(),
        from_name: Some("CRM System".to_string()),
    };
    deliver(&state, &email).await
}
