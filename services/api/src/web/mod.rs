pub mod auth;
pub mod board;
pub mod email;
pub mod extract;
pub mod insights;
pub mod middleware;
pub mod rest;
pub mod state;
pub mod students;
pub mod timeline;

pub use middleware::require_auth;

use axum::{
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

use crate::web::state::AppState;

/// Builds every route of the service. `/health` is public; everything under
/// `/api` requires an admin bearer token.
pub fn router(app_state: Arc<AppState>) -> Router {
    let public_routes = Router::new().route("/health", get(rest::health_handler));

    let protected_routes = Router::new()
        // Authentication
        .route("/api/auth/user", get(auth::current_user))
        .route("/api/auth/verify", post(auth::verify_token))
        // Students
        .route(
            "/api/students",
            get(students::list_students).post(students::create_student),
        )
        .route("/api/students/search", post(students::search_students))
        .route("/api/students/validate", post(students::validate_student))
        .route("/api/students/register", post(students::register_student))
        .route("/api/students/bulk/import", post(students::bulk_import))
        .route("/api/students/bulk/export", post(students::bulk_export))
        .route("/api/students/analytics", post(insights::student_analytics))
        .route(
            "/api/students/{id}",
            get(students::get_student)
                .put(students::update_student)
                .delete(students::delete_student),
        )
        .route("/api/students/{id}/summary", get(insights::student_summary))
        // Timelines
        .route("/api/students/{id}/timeline", get(timeline::list_timeline))
        .route(
            "/api/students/{id}/interactions",
            get(timeline::list_interactions).post(timeline::create_interaction),
        )
        .route(
            "/api/students/{id}/communications",
            get(timeline::list_communications).post(timeline::create_communication),
        )
        .route(
            "/api/students/{id}/notes",
            get(timeline::list_notes).post(timeline::create_note),
        )
        .route(
            "/api/students/{id}/notes/{note_id}",
            put(timeline::update_note).delete(timeline::delete_note),
        )
        .route(
            "/api/students/{id}/tasks",
            get(timeline::list_tasks).post(timeline::create_task),
        )
        .route(
            "/api/students/{id}/reminders",
            get(timeline::list_reminders).post(timeline::create_reminder),
        )
        .route("/api/communications", get(timeline::communications_feed))
        .route("/api/interactions", get(timeline::interactions_feed))
        // Standalone board
        .route(
            "/api/tasks",
            get(board::list_board_tasks).post(board::create_board_task),
        )
        .route(
            "/api/tasks/{id}",
            put(board::update_board_task).delete(board::delete_board_task),
        )
        .route(
            "/api/reminders",
            get(board::list_board_reminders).post(board::create_board_reminder),
        )
        .route(
            "/api/reminders/{id}",
            put(board::update_board_reminder).delete(board::delete_board_reminder),
        )
        // Insights and email
        .route("/api/dashboard/stats", get(insights::dashboard_stats))
        .route("/api/email/send", post(email::send_email))
        .route("/api/email/test", post(email::send_test_email))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(app_state)
}
