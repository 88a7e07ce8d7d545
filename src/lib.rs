pub mod config;
pub mod logger;
pub mod error;
pub mod delay_manager;
pub mod dom;
pub mod browser;
#[cfg(test)]
pub mod fixture;
pub mod session;
pub mod navigator;
pub mod extractor;
pub mod store;
pub mod resume_manager;
pub mod orchestrator;

// Exporting types for convenience
pub use config::{Config, Timeouts};
pub use error::{FailureReason, ScrapeError, StoreError};
pub use browser::{ChromeLauncher, ChromePage};
pub use session::{Launcher, Session, SessionManager};
pub use navigator::{DetailTab, Navigator};
pub use extractor::{ActionRow, Extractor, Parties};
pub use store::{open_store, FieldGroup, RecordStore};
pub use resume_manager::ProgressState;
pub use orchestrator::{AttemptOutcome, BatchOrchestrator, BatchSummary};
