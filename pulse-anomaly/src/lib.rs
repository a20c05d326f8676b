//! # Pulse Anomaly
//!
//! Z-score anomaly detection over per-execution metrics. After an execution
//! ends, each active rule for its pipeline is evaluated against a baseline
//! built from comparable history (same pipeline, same hour-of-day bucket,
//! successful, within the rule's lookback), excluding the current execution
//! and any execution already flagged for that metric. Detected anomalies are
//! committed atomically with the execution's flags, then one aggregated
//! alert is emitted.

pub mod baseline;
pub mod detector;
pub mod stats;

// Re-export commonly used types
pub use baseline::{build_sample, evaluate_rule, BaselineSample, Evaluation, RuleOutcome};
pub use detector::{AnomalyDetector, DetectionSummary};
pub use stats::{mean, sample_stdev};

/// Result type for anomaly operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for anomaly operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] pulse_storage::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether retrying the operation may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Storage(e) => e.is_transient(),
            Error::Internal(_) => true,
            _ => false,
        }
    }
}
