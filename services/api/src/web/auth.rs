//! services/api/src/web/auth.rs
//!
//! Endpoints that echo the caller resolved by `require_auth`.

use axum::{response::IntoResponse, Extension, Json};
use crm_core::ports::Identity;
use serde_json::json;

#[utoipa::path(
    get,
    path = "/api/auth/user",
    responses(
        (status = 200, description = "The authenticated account"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Account is not an admin"),
    ),
    security(("bearer" = []))
)]
pub async fn current_user(Extension(identity): Extension<Identity>) -> impl IntoResponse {
    Json(identity)
}

#[utoipa::path(
    post,
    path = "/api/auth/verify",
    responses(
        (status = 200, description = "The token is valid"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Account is not an admin"),
    ),
    security(("bearer" = []))
)]
pub async fn verify_token(Extension(identity): Extension<Identity>) -> impl IntoResponse {
    Json(json!({ "valid": true, "user": identity }))
}
