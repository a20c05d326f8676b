//! # Pulse Checks
//!
//! Periodic timeliness and freshness evaluation. Both checks resolve their
//! threshold through the two-level pipeline / pipeline-type inheritance
//! rule and write deduplicated log rows. Timeliness alerts only for rows
//! inserted by the current run; freshness alerts with the full failing set
//! while anything is stale.

pub mod freshness;
pub mod timeliness;

// Re-export commonly used types
pub use freshness::{
    evaluate_freshness_candidate, FreshnessChecker, FreshnessFailure, FreshnessReport,
    FreshnessVerdict,
};
pub use timeliness::{
    evaluate_timeliness_candidate, TimelinessChecker, TimelinessReport, TimelinessVerdict,
};

/// Result type for check operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for check operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] pulse_storage::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether retrying the operation may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Storage(e) => e.is_transient(),
            Error::Internal(_) => true,
            Error::Validation(_) => false,
        }
    }
}
