//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use crm_core::{CrmError, PortError};
use std::sync::Arc;
use tracing::error;

use crate::web::rest::{error_response, reject, HttpError};
use crate::web::state::AppState;

/// Middleware that verifies the bearer token and resolves the caller.
///
/// If valid, inserts the `Identity` into request extensions for handlers to use.
/// A missing or bad token is a 401; a valid token without an admin account is a 403.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, HttpError> {
    // 1. Extract the bearer token
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| {
            error_response(
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Missing bearer token",
            )
        })?;

    // 2. Verify it and resolve the account
    let identity = state.identity.verify(&token).await.map_err(|e| match e {
        PortError::Unauthorized => error_response(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "Invalid or expired token",
        ),
        PortError::Forbidden(detail) => {
            error_response(StatusCode::FORBIDDEN, "forbidden", detail)
        }
        other => {
            error!("Failed to verify bearer token: {:?}", other);
            reject(CrmError::from(other))
        }
    })?;

    // 3. Insert the identity into request extensions
    req.extensions_mut().insert(identity);

    // 4. Continue to the handler
    Ok(next.run(req).await)
}
