//! Job kinds, payloads and per-kind policy

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// The kinds of work the runner executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    ClosureRebuild,
    ExecutionAncestry,
    AnomalyDetection,
    TimelinessCheck,
    FreshnessCheck,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::ClosureRebuild => "closure_rebuild",
            JobKind::ExecutionAncestry => "execution_ancestry",
            JobKind::AnomalyDetection => "anomaly_detection",
            JobKind::TimelinessCheck => "timeliness_check",
            JobKind::FreshnessCheck => "freshness_check",
        }
    }

    pub fn all() -> &'static [JobKind] {
        &[
            JobKind::ClosureRebuild,
            JobKind::ExecutionAncestry,
            JobKind::AnomalyDetection,
            JobKind::TimelinessCheck,
            JobKind::FreshnessCheck,
        ]
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Work-item payload carried through the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    ClosureRebuild {
        pipeline_id: i64,
        /// Union of the pipeline's pre-existing and newly submitted
        /// address ids
        seed: Vec<i64>,
    },
    ExecutionAncestry {
        execution_id: i64,
        parent_execution_id: Option<i64>,
    },
    AnomalyDetection {
        execution_id: i64,
    },
    TimelinessCheck {
        lookback_minutes: i64,
    },
    FreshnessCheck,
}

impl JobPayload {
    pub fn kind(&self) -> JobKind {
        match self {
            JobPayload::ClosureRebuild { .. } => JobKind::ClosureRebuild,
            JobPayload::ExecutionAncestry { .. } => JobKind::ExecutionAncestry,
            JobPayload::AnomalyDetection { .. } => JobKind::AnomalyDetection,
            JobPayload::TimelinessCheck { .. } => JobKind::TimelinessCheck,
            JobPayload::FreshnessCheck => JobKind::FreshnessCheck,
        }
    }
}

/// A queued work item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub payload: JobPayload,
    /// Number of attempts already made
    pub attempt: u32,
}

impl Job {
    pub fn new(payload: JobPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            attempt: 0,
        }
    }

    pub fn kind(&self) -> JobKind {
        self.payload.kind()
    }

    /// The job re-enqueued for its next attempt
    pub fn next_attempt(mut self) -> Self {
        self.attempt += 1;
        self
    }
}

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Progress,
    Success,
    Failure,
}

/// Per-kind execution policy
#[derive(Debug, Clone)]
pub struct JobPolicy {
    /// Maximum jobs of this kind running in parallel
    pub max_concurrency: usize,

    /// Dispatch rate cap, jobs per second
    pub rate_per_second: u32,

    pub retry: RetryPolicy,

    /// Cooperative cancellation point
    pub soft_time_limit: Duration,

    /// The job is killed at this point
    pub hard_time_limit: Duration,

    /// Emit an alert when retries are exhausted
    pub alert_on_final_failure: bool,
}

impl Default for JobPolicy {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            rate_per_second: 10,
            retry: RetryPolicy::default(),
            soft_time_limit: Duration::from_secs(240),
            hard_time_limit: Duration::from_secs(300),
            alert_on_final_failure: false,
        }
    }
}

impl JobPolicy {
    /// Defaults tuned per job kind.
    ///
    /// Closure rebuilds are serialized per pipeline by an advisory lock and
    /// carry the final-failure alert hook.
    pub fn for_kind(kind: JobKind) -> Self {
        match kind {
            JobKind::ClosureRebuild => Self {
                max_concurrency: 2,
                alert_on_final_failure: true,
                ..Default::default()
            },
            JobKind::ExecutionAncestry => Self {
                max_concurrency: 8,
                rate_per_second: 50,
                ..Default::default()
            },
            JobKind::AnomalyDetection => Self {
                max_concurrency: 4,
                rate_per_second: 20,
                ..Default::default()
            },
            JobKind::TimelinessCheck | JobKind::FreshnessCheck => Self {
                max_concurrency: 1,
                rate_per_second: 1,
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_kind_mapping() {
        assert_eq!(JobPayload::FreshnessCheck.kind(), JobKind::FreshnessCheck);
        assert_eq!(
            JobPayload::ClosureRebuild {
                pipeline_id: 1,
                seed: vec![]
            }
            .kind(),
            JobKind::ClosureRebuild
        );
    }

    #[test]
    fn next_attempt_increments() {
        let job = Job::new(JobPayload::FreshnessCheck);
        assert_eq!(job.attempt, 0);
        let retried = job.next_attempt();
        assert_eq!(retried.attempt, 1);
    }

    #[test]
    fn closure_rebuild_alerts_on_final_failure() {
        assert!(JobPolicy::for_kind(JobKind::ClosureRebuild).alert_on_final_failure);
        assert!(!JobPolicy::for_kind(JobKind::AnomalyDetection).alert_on_final_failure);
    }

    #[test]
    fn payload_round_trips_through_json() {
        let payload = JobPayload::ExecutionAncestry {
            execution_id: 7,
            parent_execution_id: Some(3),
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert_eq!(serde_json::from_str::<JobPayload>(&json).unwrap(), payload);
    }
}
