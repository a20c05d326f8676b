//! # Pulse Core
//!
//! Core domain types for Pulse, the pipeline-observability service:
//! addresses, metric fields, threshold configuration, and the alert model
//! shared by the lineage, anomaly and check engines.

pub mod address;
pub mod alert;
pub mod execution;
pub mod metric;
pub mod threshold;

// Re-export commonly used types
pub use address::{parse_address_name, AddressParts, DATABASE_GROUP};
pub use alert::{Alert, AlertLevel, AlertSink, RetryingAlertSink};
pub use execution::{derive_duration_seconds, derive_throughput, hour_recorded, ExecutionStatus};
pub use metric::{AnomalyFlags, MetricField};
pub use threshold::{resolve_threshold, DatePart, ThresholdSource, ThresholdSpec};

/// Result type for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown metric field: {0}")]
    UnknownMetricField(String),

    #[error("Unknown date part: {0}")]
    UnknownDatePart(String),

    #[error("Alert delivery failed after {attempts} attempts: {message}")]
    AlertDelivery { attempts: u32, message: String },
}
