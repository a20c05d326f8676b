//! # Pulse Runtime
//!
//! The job runner: ingest and the scheduler enqueue work items, a
//! cooperative worker pool consumes them with per-kind concurrency and rate
//! limits, retries transient failures with backoff, enforces soft and hard
//! time limits, and keeps per-kind duration aggregates in a side store.

pub mod concurrency;
pub mod context;
pub mod job;
pub mod queue;
pub mod rate_limiter;
pub mod retry;
pub mod runner;
pub mod stats;

// Re-export commonly used types
pub use concurrency::ConcurrencyLimiter;
pub use context::JobContext;
pub use job::{Job, JobKind, JobPayload, JobPolicy, JobState};
pub use queue::{InMemoryJobQueue, JobQueue};
pub use rate_limiter::KindRateLimiter;
pub use retry::{RetryPolicy, RetryStrategy};
pub use runner::{JobExecutor, JobRunner};
pub use stats::JobStatsRegistry;

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for runtime operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Lineage error: {0}")]
    Lineage(#[from] pulse_lineage::Error),

    #[error("Anomaly error: {0}")]
    Anomaly(#[from] pulse_anomaly::Error),

    #[error("Check error: {0}")]
    Check(#[from] pulse_checks::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] pulse_storage::Error),

    #[error("Queue closed")]
    QueueClosed,

    #[error("Hard time limit exceeded after {0:?}")]
    HardTimeout(std::time::Duration),

    #[error("Worker task failed: {0}")]
    Join(String),
}

impl Error {
    /// Whether retrying the job may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Lineage(e) => e.is_transient(),
            Error::Anomaly(e) => e.is_transient(),
            Error::Check(e) => e.is_transient(),
            Error::Storage(e) => e.is_transient(),
            Error::HardTimeout(_) => true,
            Error::Join(_) => true,
            Error::QueueClosed => false,
        }
    }
}
