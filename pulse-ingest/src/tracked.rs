//! Tracked execution wrapper
//!
//! `run_tracked` brackets a unit of ETL work with `execution.start` and
//! `execution.end`, so a panic-free failure path still lands a terminal
//! execution row. A failed work closure is reported as
//! `completed_successfully = false` with no counters, then re-raised.

use crate::service::IngestService;
use crate::types::{ExecutionEndRequest, ExecutionStartRequest};
use chrono::Utc;
use std::future::Future;
use tracing::warn;

/// Handle given to the work closure.
#[derive(Debug, Clone, Copy)]
pub struct TrackedExecution {
    pub execution_id: i64,
}

/// Row counters the work closure reports on success.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackedCounters {
    pub inserts: Option<i64>,
    pub updates: Option<i64>,
    pub soft_deletes: Option<i64>,
    pub total_rows: Option<i64>,
}

/// Failure of a tracked run: either the bookkeeping or the work itself.
#[derive(Debug, thiserror::Error)]
pub enum TrackedError<E> {
    #[error(transparent)]
    Ingest(#[from] crate::Error),

    #[error("tracked work failed: {0}")]
    Work(E),
}

/// Run `work` inside a tracked execution.
///
/// The execution is opened with `start`, then `work` runs with the new
/// execution id. On success the execution ends successful with the reported
/// counters; on failure it ends unsuccessful and the work error is
/// re-raised. A failure while recording the unsuccessful end is logged and
/// swallowed so the original error wins.
pub async fn run_tracked<F, Fut, T, E>(
    service: &IngestService,
    start: ExecutionStartRequest,
    work: F,
) -> Result<T, TrackedError<E>>
where
    F: FnOnce(TrackedExecution) -> Fut,
    Fut: Future<Output = Result<(T, TrackedCounters), E>>,
    E: std::fmt::Display,
{
    let started = service.execution_start(start).await?;
    let execution = TrackedExecution {
        execution_id: started.id,
    };

    match work(execution).await {
        Ok((value, counters)) => {
            service
                .execution_end(ExecutionEndRequest {
                    id: execution.execution_id,
                    end_date: Utc::now(),
                    completed_successfully: true,
                    inserts: counters.inserts,
                    updates: counters.updates,
                    soft_deletes: counters.soft_deletes,
                    total_rows: counters.total_rows,
                })
                .await?;
            Ok(value)
        }
        Err(work_error) => {
            let end = service
                .execution_end(ExecutionEndRequest {
                    id: execution.execution_id,
                    end_date: Utc::now(),
                    completed_successfully: false,
                    inserts: None,
                    updates: None,
                    soft_deletes: None,
                    total_rows: None,
                })
                .await;
            if let Err(end_error) = end {
                warn!(
                    execution_id = execution.execution_id,
                    error = %end_error,
                    "Failed to record unsuccessful execution end"
                );
            }
            Err(TrackedError::Work(work_error))
        }
    }
}
