//! services/api/src/adapters/email.rs
//!
//! This module contains the adapter for the Resend email HTTP API.
//! It implements the `EmailService` port from the `core` crate.

use async_trait::async_trait;
use crm_core::domain::DEFAULT_CREATED_BY;
use crm_core::ports::{EmailReceipt, EmailService, OutboundEmail, PortError, PortResult};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::EmailSettings;

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Serialize)]
struct SendRequest<'a> {
    from: String,
    to: [&'a str; 1],
    subject: String,
    html: String,
}

#[derive(Deserialize)]
struct SendResponse {
    id: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    message: Option<String>,
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `EmailService` on top of the Resend API.
#[derive(Clone)]
pub struct ResendEmailAdapter {
    client: reqwest::Client,
    api_key: Option<String>,
    from: String,
    api_url: String,
    redirect_to: Option<String>,
}

impl ResendEmailAdapter {
    /// Creates a new `ResendEmailAdapter` whose requests give up after the
    /// configured timeout.
    pub fn new(settings: &EmailSettings) -> PortResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(Self {
            client,
            api_key: settings.api_key.clone(),
            from: settings.from.clone(),
            api_url: settings.api_url.clone(),
            redirect_to: settings.redirect_to.clone(),
        })
    }

    fn sender(&self, email: &OutboundEmail) -> String {
        match &email.from_name {
            Some(name) => format!("{} <{}>", name, self.from),
            None => self.from.clone(),
        }
    }

    /// Recipient, subject and body actually sent. In sandbox mode the email is
    /// rerouted and annotated with its intended recipient.
    fn addressed<'a>(&'a self, email: &'a OutboundEmail) -> (&'a str, String, String) {
        match &self.redirect_to {
            Some(sandbox) if sandbox != &email.to => (
                sandbox.as_str(),
                format!("[TO: {}] {}", email.to, email.subject),
                format!(
                    "<p><strong>Original recipient:</strong> {}</p>\n\
                     <p><strong>From:</strong> {}</p>\n<hr>\n{}",
                    email.to,
                    email.from_name.as_deref().unwrap_or(DEFAULT_CREATED_BY),
                    email.html
                ),
            ),
            _ => (email.to.as_str(), email.subject.clone(), email.html.clone()),
        }
    }
}

//=========================================================================================
// `EmailService` Trait Implementation
//=========================================================================================

#[async_trait]
impl EmailService for ResendEmailAdapter {
    async fn send(&self, email: &OutboundEmail) -> PortResult<EmailReceipt> {
        let Some(api_key) = &self.api_key else {
            return Ok(EmailReceipt::failed("Email service not configured"));
        };

        let (to, subject, html) = self.addressed(email);
        let body = SendRequest {
            from: self.sender(email),
            to: [to],
            subject,
            html,
        };

        let response = match self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                warn!(to, "email transport timed out");
                return Err(PortError::Timeout("Email service timeout".to_string()));
            }
            Err(e) => {
                warn!(to, error = %e, "email transport failed");
                return Ok(EmailReceipt::failed(format!("Failed to send email: {}", e)));
            }
        };

        let status = response.status();
        if status.is_success() {
            let sent: SendResponse = response
                .json()
                .await
                .unwrap_or(SendResponse { id: None });
            info!(to, message_id = ?sent.id, "email sent");
            return Ok(EmailReceipt::sent(sent.id));
        }

        let message = response
            .json::<ErrorResponse>()
            .await
            .ok()
            .and_then(|e| e.message)
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        warn!(to, status = status.as_u16(), %message, "email rejected by transport");
        Ok(EmailReceipt::failed(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(server: &MockServer, key: Option<&str>) -> EmailSettings {
        EmailSettings {
            api_key: key.map(String::from),
            from: "crm@example.com".to_string(),
            api_url: format!("{}/emails", server.uri()),
            timeout: Duration::from_secs(5),
            redirect_to: None,
        }
    }

    fn email() -> OutboundEmail {
        OutboundEmail {
            to: "maria@example.com".to_string(),
            subject: "Welcome".to_string(),
            html: "<p>Hi</p>".to_string(),
            from_name: Some("Admissions".to_string()),
        }
    }

    #[tokio::test]
    async fn sends_with_bearer_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .and(header("authorization", "Bearer re_test"))
            .and(body_partial_json(json!({
                "from": "Admissions <crm@example.com>",
                "to": ["maria@example.com"],
                "subject": "Welcome"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "msg_1"})))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = ResendEmailAdapter::new(&settings(&server, Some("re_test"))).unwrap();
        let receipt = adapter.send(&email()).await.unwrap();
        assert_eq!(receipt, EmailReceipt::sent(Some("msg_1".to_string())));
    }

    #[tokio::test]
    async fn rejection_message_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(422).set_body_json(json!({"message": "Invalid `to` field"})),
            )
            .mount(&server)
            .await;
        let adapter = ResendEmailAdapter::new(&settings(&server, Some("re_test"))).unwrap();
        let receipt = adapter.send(&email()).await.unwrap();
        assert!(!receipt.success);
        assert_eq!(receipt.error.as_deref(), Some("Invalid `to` field"));
    }

    #[tokio::test]
    async fn rejection_without_message_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let adapter = ResendEmailAdapter::new(&settings(&server, Some("re_test"))).unwrap();
        let receipt = adapter.send(&email()).await.unwrap();
        assert_eq!(receipt.error.as_deref(), Some("HTTP 503"));
    }

    #[tokio::test]
    async fn missing_key_is_not_configured() {
        let server = MockServer::start().await;
        let adapter = ResendEmailAdapter::new(&settings(&server, None)).unwrap();
        let receipt = adapter.send(&email()).await.unwrap();
        assert_eq!(receipt.error.as_deref(), Some("Email service not configured"));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn slow_transport_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"id": "late"}))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;
        let mut slow = settings(&server, Some("re_test"));
        slow.timeout = Duration::from_millis(200);
        let adapter = ResendEmailAdapter::new(&slow).unwrap();
        assert!(matches!(
            adapter.send(&email()).await,
            Err(PortError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn sandbox_redirect_annotates_recipient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "to": ["sandbox@example.com"],
                "subject": "[TO: maria@example.com] Welcome"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "msg_2"})))
            .expect(1)
            .mount(&server)
            .await;
        let mut sandboxed = settings(&server, Some("re_test"));
        sandboxed.redirect_to = Some("sandbox@example.com".to_string());
        let adapter = ResendEmailAdapter::new(&sandboxed).unwrap();
        let receipt = adapter.send(&email()).await.unwrap();
        assert!(receipt.success);
    }
}
