//! End-to-end tests driving the real router over the in-memory document store.

use api_lib::config::Config;
use api_lib::web::{self, state::AppState};
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use crm_core::ports::{
    EmailReceipt, EmailService, Identity, IdentityVerifier, OutboundEmail, PortError, PortResult,
};
use crm_core::InMemoryDocumentStore;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

const ADMIN: &str = "admin-token";
const VIEWER: &str = "viewer-token";

//=========================================================================================
// Fakes
//=========================================================================================

struct FakeIdentity;

#[async_trait]
impl IdentityVerifier for FakeIdentity {
    async fn verify(&self, bearer: &str) -> PortResult<Identity> {
        match bearer {
            ADMIN => Ok(Identity {
                subject_id: "admin-1".to_string(),
                email: Some("admin@example.com".to_string()),
                name: Some("Avery".to_string()),
                role: "admin".to_string(),
            }),
            VIEWER => Err(PortError::Forbidden("admin role required".to_string())),
            _ => Err(PortError::Unauthorized),
        }
    }
}

#[derive(Default)]
struct RecordingEmail {
    sent: Mutex<Vec<OutboundEmail>>,
}

#[async_trait]
impl EmailService for RecordingEmail {
    async fn send(&self, email: &OutboundEmail) -> PortResult<EmailReceipt> {
        if email.to == "slow@example.com" {
            return Err(PortError::Timeout("Email service timeout".to_string()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(email.clone());
        }
        Ok(EmailReceipt::sent(Some("msg_1".to_string())))
    }
}

struct Harness {
    app: Router,
    store: Arc<InMemoryDocumentStore>,
    email: Arc<RecordingEmail>,
}

fn config() -> Config {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("STORE_BACKEND", "memory"),
        ("AUTH_JWT_SECRET", "0123456789abcdef0123456789abcdef"),
        ("AUTH_JWT_ISSUER", "crm"),
    ]);
    Config::from_lookup(|key| vars.get(key).map(|v| v.to_string())).expect("config")
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryDocumentStore::new());
    let email = Arc::new(RecordingEmail::default());
    let state = AppState::new(
        store.clone(),
        Arc::new(config()),
        email.clone(),
        None,
        Arc::new(FakeIdentity),
    );
    Harness {
        app: web::router(Arc::new(state)),
        store,
        email,
    }
}

async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().uri(uri).method(method);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request");

    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, value)
}

async fn admin(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    call(app, method, uri, Some(ADMIN), body).await
}

async fn create_student(app: &Router, name: &str, email: &str) -> String {
    let (status, body) = admin(
        app,
        "POST",
        "/api/students",
        Some(json!({"name": name, "email": email, "country": "Spain", "status": "Exploring"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().expect("id").to_string()
}

//=========================================================================================
// Authentication
//=========================================================================================

#[tokio::test]
async fn health_is_public() {
    let h = harness();
    let (status, body) = call(&h.app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], "memory");
}

#[tokio::test]
async fn api_requires_an_admin_token() {
    let h = harness();

    let (status, body) = call(&h.app, "GET", "/api/students", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = call(&h.app, "GET", "/api/students", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = call(&h.app, "GET", "/api/students", Some(VIEWER), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, body) = admin(&h.app, "GET", "/api/auth/user", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["subject_id"], "admin-1");

    let (status, body) = admin(&h.app, "POST", "/api/auth/verify", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
}

//=========================================================================================
// Students
//=========================================================================================

#[tokio::test]
async fn student_lifecycle() {
    let h = harness();
    let id = create_student(&h.app, "Maria Garcia", "maria@example.com").await;

    let (status, body) = admin(&h.app, "GET", &format!("/api/students/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "maria@example.com");
    assert_eq!(body["high_intent"], false);

    let (status, body) = admin(
        &h.app,
        "PUT",
        &format!("/api/students/{id}"),
        Some(json!({"status": "Applying", "high_intent": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Applying");
    assert_eq!(body["high_intent"], true);

    let (status, body) = admin(&h.app, "GET", "/api/students?status=Applying", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));

    let (status, _) = admin(&h.app, "DELETE", &format!("/api/students/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = admin(&h.app, "GET", &format!("/api/students/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, _) = admin(&h.app, "DELETE", &format!("/api/students/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_student_requests_are_bad_requests() {
    let h = harness();
    let id = create_student(&h.app, "Maria Garcia", "maria@example.com").await;

    let (status, body) = admin(
        &h.app,
        "POST",
        "/api/students",
        Some(json!({"name": "Copy", "email": "maria@example.com", "country": "Spain"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "duplicate_email");

    let (status, body) = admin(
        &h.app,
        "PUT",
        &format!("/api/students/{id}"),
        Some(json!({"email": "other@example.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, body) = admin(
        &h.app,
        "POST",
        "/api/students",
        Some(json!({"name": "No Email"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, _) = admin(&h.app, "GET", "/api/students?limit=5000", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn profile_updates_stamp_last_active_server_side() {
    let h = harness();
    let id = create_student(&h.app, "Maria Garcia", "maria@example.com").await;

    let (status, body) = admin(
        &h.app,
        "PUT",
        &format!("/api/students/{id}"),
        Some(json!({"status": "Applying", "last_active": "2000-01-01T00:00:00Z"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, body) = admin(
        &h.app,
        "PUT",
        &format!("/api/students/{id}"),
        Some(json!({"status": "Applying"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let stamped = body["last_active"].as_str().expect("last_active");
    assert!(!stamped.starts_with("2000"), "{stamped}");
}

#[tokio::test]
async fn search_validate_and_export() {
    let h = harness();
    create_student(&h.app, "Maria Garcia", "maria@example.com").await;
    create_student(&h.app, "Li Wei", "li@example.com").await;

    let (status, body) = admin(
        &h.app,
        "POST",
        "/api/students/search",
        Some(json!({"query": "MARIA"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["students"][0]["name"], "Maria Garcia");
    assert_eq!(body["has_more"], false);

    let (status, body) = admin(
        &h.app,
        "POST",
        "/api/students/search",
        Some(json!({"query": "", "offset": u64::MAX, "limit": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["students"], json!([]));
    assert_eq!(body["has_more"], false);

    let (status, body) = admin(
        &h.app,
        "POST",
        "/api/students/validate",
        Some(json!({"name": "Maria", "email": "maria@example.com", "country": "Spain"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], false);

    let (status, body) = admin(
        &h.app,
        "POST",
        "/api/students/bulk/export",
        Some(json!({"format": "csv"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content_type"], "text/csv");
    let csv = body["file_data"].as_str().expect("csv");
    assert_eq!(csv.lines().count(), 3);

    let (status, _) = admin(
        &h.app,
        "POST",
        "/api/students/bulk/export",
        Some(json!({"format": "xml"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn bulk_import_reports_rows() {
    let h = harness();
    create_student(&h.app, "Maria Garcia", "maria@example.com").await;

    let (status, body) = admin(
        &h.app,
        "POST",
        "/api/students/bulk/import",
        Some(json!({"students": [
            {"name": "Ana", "email": "ana@example.com", "country": "Peru"},
            {"name": "Dup", "email": "maria@example.com", "country": "Spain"}
        ]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["imported"], 1);
    assert_eq!(body["failed"], 1);
    assert_eq!(h.store.count("students").await, 2);
}

//=========================================================================================
// Timelines and board
//=========================================================================================

#[tokio::test]
async fn notes_can_be_added_edited_and_removed() {
    let h = harness();
    let id = create_student(&h.app, "Maria Garcia", "maria@example.com").await;

    let (status, note) = admin(
        &h.app,
        "POST",
        &format!("/api/students/{id}/notes"),
        Some(json!({"title": "Essay", "content": "Needs a hook"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(note["type"], "note");
    assert_eq!(note["student_id"], id.as_str());
    assert_eq!(note["created_by"], "CRM Team");
    let note_id = note["id"].as_str().expect("note id").to_string();

    let (status, body) = admin(
        &h.app,
        "PUT",
        &format!("/api/students/{id}/notes/{note_id}"),
        Some(json!({"content": "Hook drafted"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"], "Hook drafted");
    assert_eq!(body["title"], "Essay");

    let (status, body) = admin(&h.app, "GET", &format!("/api/students/{id}/timeline?type=note"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));

    let (status, _) = admin(&h.app, "DELETE", &format!("/api/students/{id}/notes/{note_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = admin(&h.app, "DELETE", &format!("/api/students/{id}/notes/{note_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn events_for_unknown_students_are_not_found() {
    let h = harness();
    let (status, body) = admin(
        &h.app,
        "POST",
        "/api/students/ghost/interactions",
        Some(json!({"interaction_type": "call", "description": "Intro"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn timeline_is_newest_first_and_feeds_carry_the_student() {
    let h = harness();
    let id = create_student(&h.app, "Maria Garcia", "maria@example.com").await;

    for description in ["first", "second"] {
        let (status, _) = admin(
            &h.app,
            "POST",
            &format!("/api/students/{id}/interactions"),
            Some(json!({"interaction_type": "call", "description": description})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, body) = admin(&h.app, "GET", &format!("/api/students/{id}/interactions"), None).await;
    let events = body.as_array().expect("events");
    assert_eq!(events.len(), 2);
    assert!(events[0]["created_at"].as_str() >= events[1]["created_at"].as_str());

    let (status, feed) = admin(&h.app, "GET", "/api/interactions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(feed[0]["student_name"], "Maria Garcia");
    assert_eq!(feed[0]["student_email"], "maria@example.com");
}

#[tokio::test]
async fn board_tasks_round_trip() {
    let h = harness();
    let (status, task) = admin(
        &h.app,
        "POST",
        "/api/tasks",
        Some(json!({"title": "Call back", "due_date": "2030-01-15", "priority": "high"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(task["student_id"], "standalone");
    let task_id = task["id"].as_str().expect("task id").to_string();

    let (status, body) = admin(
        &h.app,
        "PUT",
        &format!("/api/tasks/{task_id}"),
        Some(json!({"status": "completed"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["priority"], "high");

    let (status, body) = admin(
        &h.app,
        "PUT",
        &format!("/api/tasks/{task_id}"),
        Some(json!({"studentId": "someone-else"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (_, list) = admin(&h.app, "GET", "/api/tasks", None).await;
    assert_eq!(list.as_array().map(Vec::len), Some(1));
    assert_eq!(list[0]["student_id"], "standalone");

    let (status, _) = admin(&h.app, "PUT", "/api/tasks/missing", Some(json!({"status": "completed"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = admin(&h.app, "DELETE", &format!("/api/tasks/{task_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = admin(&h.app, "DELETE", &format!("/api/tasks/{task_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

//=========================================================================================
// Insights
//=========================================================================================

#[tokio::test]
async fn dashboard_and_summary() {
    let h = harness();
    let id = create_student(&h.app, "Maria Garcia", "maria@example.com").await;
    let (status, _) = admin(
        &h.app,
        "POST",
        "/api/reminders",
        Some(json!({"title": "Deadline", "reminder_date": "2000-01-01"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, stats) = admin(&h.app, "GET", "/api/dashboard/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_students"], 1);
    assert_eq!(stats["overdue_reminders"], 1);
    assert_eq!(stats["changes"]["total_students"]["previous"], Value::Null);

    let (status, summary) = admin(&h.app, "GET", &format!("/api/students/{id}/summary"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["source"], "template");
    assert!(summary["summary"].as_str().unwrap_or_default().contains("Maria Garcia"));

    let (status, _) = admin(
        &h.app,
        "POST",
        "/api/students/analytics",
        Some(json!({"date_range_days": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn store_outage_is_a_server_error() {
    let h = harness();
    create_student(&h.app, "Maria Garcia", "maria@example.com").await;
    h.store.set_unavailable(true);

    let (status, body) = admin(&h.app, "GET", "/api/students", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "upstream_unavailable");
}

//=========================================================================================
// Email
//=========================================================================================

#[tokio::test]
async fn email_send_and_timeout() {
    let h = harness();
    let (status, receipt) = admin(
        &h.app,
        "POST",
        "/api/email/send",
        Some(json!({"to": "maria@example.com", "subject": "Hi", "html": "<p>Hi</p>"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["success"], true);
    assert_eq!(receipt["message_id"], "msg_1");

    let (status, _) = admin(&h.app, "POST", "/api/email/test", None).await;
    assert_eq!(status, StatusCode::OK);
    let recorded = h.email.sent.lock().map(|s| s.len()).unwrap_or_default();
    assert_eq!(recorded, 2);

    let (status, body) = admin(
        &h.app,
        "POST",
        "/api/email/send",
        Some(json!({"to": "slow@example.com", "subject": "Hi", "html": ""})),
    )
    .await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["error"], "timeout");
}
