use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while driving a portal session.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("element not found: {0}")]
    ElementNotFound(&'static str),

    #[error("no clickable row in results table")]
    NoClickableRow,

    #[error("access blocked after {attempts} attempt(s)")]
    Blocked { attempts: u32 },

    #[error("session unavailable: {0}")]
    SessionUnavailable(String),

    #[error("browser driver error: {0}")]
    Driver(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised by the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record store not found: {0}")]
    StoreUnavailable(PathBuf),

    #[error("case number {0} not found in record store")]
    KeyNotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("spreadsheet error: {0}")]
    Xlsx(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// Why a single attempt for a case number did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    ElementNotFound,
    NoClickableRow,
    Blocked,
    SessionUnavailable,
    Driver,
    Store,
    /// All stages ran but at least one field came back empty.
    IncompleteExtraction,
}

impl From<&ScrapeError> for FailureReason {
    fn from(err: &ScrapeError) -> Self {
        match err {
            ScrapeError::ElementNotFound(_) => FailureReason::ElementNotFound,
            ScrapeError::NoClickableRow => FailureReason::NoClickableRow,
            ScrapeError::Blocked { .. } => FailureReason::Blocked,
            ScrapeError::SessionUnavailable(_) => FailureReason::SessionUnavailable,
            ScrapeError::Driver(_) => FailureReason::Driver,
            ScrapeError::Store(_) => FailureReason::Store,
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureReason::ElementNotFound => "element_not_found",
            FailureReason::NoClickableRow => "no_clickable_row",
            FailureReason::Blocked => "blocked",
            FailureReason::SessionUnavailable => "session_unavailable",
            FailureReason::Driver => "driver_error",
            FailureReason::Store => "store_error",
            FailureReason::IncompleteExtraction => "incomplete_extraction",
        };
        f.write_str(s)
    }
}
