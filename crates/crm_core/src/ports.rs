//! crates/crm_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete document store, email transport, LLM and
//! identity provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::SummaryBundle;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Timed out: {0}")]
    Timeout(String),
    /// The store cannot serve this ordered query natively (e.g. no composite index).
    #[error("Query needs an index the store does not have: {0}")]
    IndexUnavailable(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Document Store
//=========================================================================================

/// A stored document body: a string-keyed map of JSON values.
pub type Document = Map<String, Value>;

/// A document together with the id the store assigned it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub data: Document,
}

/// Collection paths used by the CRM.
pub mod collections {
    pub const STUDENTS: &str = "students";
    pub const TASKS: &str = "tasks";
    pub const REMINDERS: &str = "reminders";
    pub const USERS: &str = "users";

    /// The per-student timeline subcollection.
    pub fn timeline(student_id: &str) -> String {
        format!("{}/{}/timeline", STUDENTS, student_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Equality filters, ordering and paging for [`DocumentStore::query`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentQuery {
    pub filters: Vec<(String, Value)>,
    pub order_by: Option<(String, SortDirection)>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl DocumentQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The same query without ordering, for stores that cannot sort it.
    pub fn unordered(&self) -> Self {
        Self {
            order_by: None,
            ..self.clone()
        }
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetches a document by id; `None` when it does not exist.
    async fn get(&self, collection: &str, id: &str) -> PortResult<Option<Document>>;

    async fn query(&self, collection: &str, query: &DocumentQuery)
        -> PortResult<Vec<StoredDocument>>;

    /// Inserts a document and returns the id the store assigned.
    async fn add(&self, collection: &str, data: Document) -> PortResult<String>;

    /// Stores a document under a caller-chosen id, replacing any existing one.
    async fn put(&self, collection: &str, id: &str, data: Document) -> PortResult<()>;

    /// Merges `patch` into the top level of an existing document.
    /// Fails with `NotFound` when the document does not exist.
    async fn update(&self, collection: &str, id: &str, patch: Document) -> PortResult<()>;

    /// Deletes a document. Deleting a missing document is not an error.
    async fn delete(&self, collection: &str, id: &str) -> PortResult<()>;
}

//=========================================================================================
// Email Transport
//=========================================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
    #[serde(default)]
    pub from_name: Option<String>,
}

/// Outcome of a send attempt. Rejections and transport failures are reported
/// here; only a missed deadline is raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailReceipt {
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

impl EmailReceipt {
    pub fn sent(message_id: Option<String>) -> Self {
        Self {
            success: true,
            message_id,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

#[async_trait]
pub trait EmailService: Send + Sync {
    /// Sends one email. `Timeout` when the transport misses its deadline.
    async fn send(&self, email: &OutboundEmail) -> PortResult<EmailReceipt>;
}

//=========================================================================================
// Summary Generation
//=========================================================================================

#[async_trait]
pub trait SummaryService: Send + Sync {
    /// Produces a free-text summary of a student's profile and recent activity.
    async fn generate_summary(&self, bundle: &SummaryBundle) -> PortResult<String>;
}

//=========================================================================================
// Identity Verification
//=========================================================================================

/// The verified caller of an authenticated request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub subject_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: String,
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Verifies a bearer credential. `Unauthorized` for a bad credential,
    /// `Forbidden` for a valid one without the required role.
    async fn verify(&self, bearer: &str) -> PortResult<Identity>;
}
