pub mod db;
pub mod email;
pub mod identity;
pub mod summary_llm;

pub use db::PgDocumentStore;
pub use email::ResendEmailAdapter;
pub use identity::{provision_admins, JwtIdentityVerifier};
pub use summary_llm::OpenAiSummaryAdapter;
