//! crates/crm_core/src/error.rs
//!
//! Error taxonomy for the CRM services and the read-failure policy that decides
//! whether list/aggregate reads surface store failures.

use crate::ports::PortError;
use serde::Deserialize;
use std::str::FromStr;
use tracing::warn;

/// Everything a CRM operation can fail with, kept distinct up to the HTTP boundary.
#[derive(Debug, thiserror::Error)]
pub enum CrmError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Student with email {0} already exists")]
    DuplicateEmail(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Stored {entity} document is missing required field '{field}'")]
    MissingRequiredField {
        entity: &'static str,
        field: &'static str,
    },

    #[error("Upstream service unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Upstream call timed out: {0}")]
    Timeout(String),

    #[error("Failed to encode output: {0}")]
    Encoding(String),
}

impl CrmError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        CrmError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Short machine-readable label used in error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            CrmError::NotFound { .. } => "not_found",
            CrmError::DuplicateEmail(_) => "duplicate_email",
            CrmError::Validation(_) => "validation_error",
            CrmError::MissingRequiredField { .. } => "missing_required_field",
            CrmError::UpstreamUnavailable(_) => "upstream_unavailable",
            CrmError::Timeout(_) => "timeout",
            CrmError::Encoding(_) => "encoding_error",
        }
    }
}

impl From<PortError> for CrmError {
    fn from(e: PortError) -> Self {
        match e {
            PortError::NotFound(what) => CrmError::NotFound {
                entity: "document",
                id: what,
            },
            PortError::Timeout(detail) => CrmError::Timeout(detail),
            other => CrmError::UpstreamUnavailable(other.to_string()),
        }
    }
}

/// A convenience type alias for `Result<T, CrmError>`.
pub type CrmResult<T> = Result<T, CrmError>;

/// What list and aggregate reads do when the store fails underneath them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadFailurePolicy {
    /// Propagate the failure to the caller.
    #[default]
    Fail,
    /// Log it and answer with an empty result.
    Degrade,
}

impl FromStr for ReadFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail" | "fail_loud" | "strict" => Ok(ReadFailurePolicy::Fail),
            "degrade" | "empty" => Ok(ReadFailurePolicy::Degrade),
            other => Err(format!("'{}' is not a read failure policy (fail|degrade)", other)),
        }
    }
}

impl ReadFailurePolicy {
    /// Applies the policy to the outcome of a list read.
    pub fn apply<T: Default>(&self, what: &str, result: CrmResult<T>) -> CrmResult<T> {
        match (self, result) {
            (_, Ok(value)) => Ok(value),
            (ReadFailurePolicy::Degrade, Err(e)) => {
                warn!(error = %e, "{} failed, answering with an empty result", what);
                Ok(T::default())
            }
            (ReadFailurePolicy::Fail, Err(e)) => Err(e),
        }
    }
}
