pub mod directory;
pub mod domain;
pub mod error;
pub mod export;
pub mod insights;
pub mod memory;
pub mod normalize;
pub mod ports;
pub mod query;
pub mod summary;
pub mod timeline;

pub use directory::StudentDirectory;
pub use error::{CrmError, CrmResult, ReadFailurePolicy};
pub use insights::Insights;
pub use memory::InMemoryDocumentStore;
pub use ports::{
    DocumentStore, EmailService, IdentityVerifier, PortError, PortResult, SummaryService,
};
pub use timeline::TimelineStore;
