//! # Pulse Ingest
//!
//! Transport-agnostic ingest operations. ETL processes report pipelines,
//! executions and lineage through [`IngestService`]; cheap writes happen
//! synchronously and everything heavier is enqueued for the job runner.
//! Errors map onto the client-visible kinds a transport adapter can turn
//! into status codes.

pub mod service;
pub mod tracked;
pub mod types;

pub use service::IngestService;
pub use tracked::{run_tracked, TrackedCounters, TrackedError, TrackedExecution};

/// Result type for ingest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Client-visible error kinds
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Rejected at the ingest boundary
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// `end_date` not after `start_date`
    #[error("Check violation: {0}")]
    CheckViolation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<pulse_storage::Error> for Error {
    fn from(e: pulse_storage::Error) -> Self {
        match e {
            pulse_storage::Error::NotFound(msg) => Error::NotFound(msg),
            pulse_storage::Error::Conflict(msg) => Error::Conflict(msg),
            pulse_storage::Error::CheckViolation(msg) => Error::CheckViolation(msg),
            pulse_storage::Error::Validation(msg) => Error::Validation(msg),
            other => Error::Internal(other.to_string()),
        }
    }
}

impl From<pulse_anomaly::Error> for Error {
    fn from(e: pulse_anomaly::Error) -> Self {
        match e {
            pulse_anomaly::Error::NotFound(msg) => Error::NotFound(msg),
            pulse_anomaly::Error::InvalidRule(msg) => Error::Validation(msg),
            pulse_anomaly::Error::Storage(inner) => inner.into(),
            other => Error::Internal(other.to_string()),
        }
    }
}

impl From<pulse_core::Error> for Error {
    fn from(e: pulse_core::Error) -> Self {
        match e {
            pulse_core::Error::UnknownMetricField(f) => {
                Error::Validation(format!("unknown metric field: {f}"))
            }
            pulse_core::Error::UnknownDatePart(p) => {
                Error::Validation(format!("unknown datepart: {p}"))
            }
            pulse_core::Error::Validation(msg) => Error::Validation(msg),
            other => Error::Internal(other.to_string()),
        }
    }
}

impl From<pulse_runtime::Error> for Error {
    fn from(e: pulse_runtime::Error) -> Self {
        Error::Internal(e.to_string())
    }
}
