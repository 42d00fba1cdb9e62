//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use crm_core::ports::{DocumentStore, EmailService, IdentityVerifier, SummaryService};
use crm_core::{Insights, StudentDirectory, TimelineStore};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub directory: Arc<StudentDirectory>,
    pub timeline: Arc<TimelineStore>,
    pub insights: Arc<Insights>,
    pub email: Arc<dyn EmailService>,
    /// `None` when no LLM is configured; summaries then use the template.
    pub summarizer: Option<Arc<dyn SummaryService>>,
    pub identity: Arc<dyn IdentityVerifier>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wires the CRM services on top of a single document store.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        config: Arc<Config>,
        email: Arc<dyn EmailService>,
        summarizer: Option<Arc<dyn SummaryService>>,
        identity: Arc<dyn IdentityVerifier>,
    ) -> Self {
        let timeline = Arc::new(TimelineStore::new(
            store.clone(),
            config.read_failure_policy,
            config.fetch_limit,
        ));
        let directory = Arc::new(StudentDirectory::new(
            store,
            timeline.clone(),
            config.read_failure_policy,
            config.fetch_limit,
        ));
        let insights = Arc::new(Insights::new(
            directory.clone(),
            timeline.clone(),
            config.summary_timeout,
        ));
        Self {
            directory,
            timeline,
            insights,
            email,
            summarizer,
            identity,
            config,
        }
    }
}
