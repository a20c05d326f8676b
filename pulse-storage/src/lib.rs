//! # Pulse Storage
//!
//! Metric store for Pulse over PostgreSQL: executions, lineage edges and
//! closure tables, anomaly rules and results, timeliness/freshness logs and
//! job statistics, with the transactional guarantees the engines rely on
//! (race-safe get-or-create, atomic edge replacement, savepoint-scoped
//! closure rebuilds, deduplicated log appends).

pub mod models;
pub mod postgres;
pub mod schema;

// Re-export commonly used types
pub use models::{
    AddressModel, AddressTypeModel, AnomalyResultModel, AnomalyRuleModel, ClosureRowModel,
    ExecutionModel, FreshnessCandidateRow, FreshnessLogKey, JobStatModel, LineageEdgeModel,
    NewAnomalyResult, NewClosureRow, NewFreshnessLog, NewTimelinessLog, PipelineModel,
    PipelineTypeModel, TimelinessCandidateRow,
};
pub use postgres::{ExecutionCounters, MetricStore, PoolConfig};

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for storage operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Check violation: {0}")]
    CheckViolation(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether retrying the operation may succeed.
    ///
    /// Pool exhaustion, connectivity loss, serialization failures and
    /// unique-violation races are transient; missing rows and validation
    /// errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Database(e) => match e {
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => true,
                sqlx::Error::Database(db) => {
                    // 40001 serialization_failure, 40P01 deadlock_detected.
                    // 23505 unique_violation is raised only by closure-row
                    // inserts racing a rebuild of an overlapping component;
                    // the rebuild re-traverses on retry.
                    matches!(
                        db.code().as_deref(),
                        Some("40001") | Some("40P01") | Some("23505")
                    )
                }
                _ => false,
            },
            Error::Internal(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    #[derive(Debug)]
    struct PgError(&'static str);

    impl std::fmt::Display for PgError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "sqlstate {}", self.0)
        }
    }

    impl std::error::Error for PgError {}

    impl sqlx::error::DatabaseError for PgError {
        fn message(&self) -> &str {
            "database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.0))
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            match self.0 {
                "23505" => sqlx::error::ErrorKind::UniqueViolation,
                _ => sqlx::error::ErrorKind::Other,
            }
        }
    }

    fn db_error(code: &'static str) -> Error {
        Error::Database(sqlx::Error::Database(Box::new(PgError(code))))
    }

    #[test]
    fn retryable_sqlstates() {
        assert!(db_error("40001").is_transient());
        assert!(db_error("40P01").is_transient());
        assert!(db_error("23505").is_transient());
        assert!(!db_error("23503").is_transient());
    }

    #[test]
    fn transient_classification_outside_sqlstates() {
        assert!(Error::Database(sqlx::Error::PoolTimedOut).is_transient());
        assert!(Error::Internal("pool hiccup".into()).is_transient());
        assert!(!Error::NotFound("execution 7".into()).is_transient());
        assert!(!Error::Conflict("already ended".into()).is_transient());
    }
}
