//! The job runner
//!
//! Consumes jobs from the queue and dispatches them to the engines through
//! the [`JobExecutor`] seam. Each kind runs under its own concurrency limit
//! and dispatch rate; failures retry per the kind's [`JobPolicy`], and the
//! runner emits an alert when a kind configured for it exhausts its retries.

use crate::concurrency::ConcurrencyLimiter;
use crate::context::JobContext;
use crate::job::{Job, JobKind, JobPayload, JobPolicy, JobState};
use crate::queue::JobQueue;
use crate::rate_limiter::KindRateLimiter;
use crate::stats::JobStatsRegistry;
use crate::{Error, Result};
use async_trait::async_trait;
use pulse_core::alert::{Alert, AlertLevel, AlertSink};
use pulse_storage::MetricStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

/// Seam between the runner and the engines that do the work.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, payload: &JobPayload) -> Result<()>;
}

#[async_trait]
impl JobExecutor for JobContext {
    async fn execute(&self, payload: &JobPayload) -> Result<()> {
        match payload {
            JobPayload::ClosureRebuild { pipeline_id, seed } => {
                let summary = self
                    .rebuilder
                    .rebuild_for_pipeline(*pipeline_id, seed.clone())
                    .await?;
                info!(
                    pipeline_id,
                    vertices = summary.vertices,
                    edges = summary.edges,
                    rows_deleted = summary.rows_deleted,
                    rows_inserted = summary.rows_inserted,
                    "Closure rebuild complete"
                );
                Ok(())
            }
            JobPayload::ExecutionAncestry {
                execution_id,
                parent_execution_id,
            } => {
                self.ancestry
                    .record(*execution_id, *parent_execution_id)
                    .await?;
                Ok(())
            }
            JobPayload::AnomalyDetection { execution_id } => {
                self.detector.detect(*execution_id).await?;
                Ok(())
            }
            JobPayload::TimelinessCheck { lookback_minutes } => {
                self.timeliness.run(*lookback_minutes).await?;
                Ok(())
            }
            JobPayload::FreshnessCheck => {
                self.freshness.run().await?;
                Ok(())
            }
        }
    }
}

/// Worker pool driving jobs from the queue to completion.
pub struct JobRunner {
    queue: Arc<dyn JobQueue>,
    executor: Arc<dyn JobExecutor>,
    alert_sink: Arc<dyn AlertSink>,
    policies: HashMap<JobKind, JobPolicy>,
    limiters: HashMap<JobKind, Arc<ConcurrencyLimiter>>,
    rate: Arc<KindRateLimiter>,
    stats: Arc<JobStatsRegistry>,
    stats_store: Option<Arc<MetricStore>>,
}

impl JobRunner {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        executor: Arc<dyn JobExecutor>,
        alert_sink: Arc<dyn AlertSink>,
    ) -> Self {
        let policies: HashMap<JobKind, JobPolicy> = JobKind::all()
            .iter()
            .map(|kind| (*kind, JobPolicy::for_kind(*kind)))
            .collect();
        let limiters = policies
            .iter()
            .map(|(kind, policy)| {
                (
                    *kind,
                    Arc::new(ConcurrencyLimiter::new(policy.max_concurrency)),
                )
            })
            .collect();
        Self {
            queue,
            executor,
            alert_sink,
            policies,
            limiters,
            rate: Arc::new(KindRateLimiter::new()),
            stats: Arc::new(JobStatsRegistry::new()),
            stats_store: None,
        }
    }

    /// Persist the duration aggregates to `store` when the runner drains.
    pub fn with_stats_store(mut self, store: Arc<MetricStore>) -> Self {
        self.stats_store = Some(store);
        self
    }

    /// Replace the policy for one kind; rebuilds its concurrency limiter.
    pub fn with_policy(mut self, kind: JobKind, policy: JobPolicy) -> Self {
        self.limiters.insert(
            kind,
            Arc::new(ConcurrencyLimiter::new(policy.max_concurrency)),
        );
        self.policies.insert(kind, policy);
        self
    }

    pub fn stats(&self) -> Arc<JobStatsRegistry> {
        Arc::clone(&self.stats)
    }

    /// Drive the queue until it is closed and drained, wait for in-flight
    /// jobs, then flush the duration aggregates to the configured store.
    pub async fn run(&self) -> Result<()> {
        let mut tasks = JoinSet::new();

        while let Some(job) = self.queue.dequeue().await {
            let kind = job.kind();
            let policy = self
                .policies
                .get(&kind)
                .cloned()
                .unwrap_or_else(|| JobPolicy::for_kind(kind));
            let limiter = self
                .limiters
                .get(&kind)
                .cloned()
                .unwrap_or_else(|| Arc::new(ConcurrencyLimiter::new(policy.max_concurrency)));

            let executor = Arc::clone(&self.executor);
            let queue = Arc::clone(&self.queue);
            let alert_sink = Arc::clone(&self.alert_sink);
            let stats = Arc::clone(&self.stats);
            let rate = Arc::clone(&self.rate);
            // The rate and concurrency waits happen inside the worker task,
            // so a throttled kind never blocks dispatch of the others.
            tasks.spawn(async move {
                rate.acquire(kind, Some(policy.rate_per_second)).await;
                let _permit = limiter.acquire().await;
                process_job(job, policy, executor, queue, alert_sink, stats).await;
            });

            // Reap whatever has already finished so the set stays small.
            while let Some(joined) = tasks.try_join_next() {
                log_join_outcome(joined);
            }
        }

        while let Some(joined) = tasks.join_next().await {
            log_join_outcome(joined);
        }

        if let Some(store) = &self.stats_store {
            self.stats.flush(store).await?;
        }
        Ok(())
    }
}

fn log_join_outcome(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "Worker task panicked");
    }
}

#[instrument(
    name = "job.process",
    skip_all,
    fields(job_id = %job.id, kind = %job.kind(), attempt = job.attempt)
)]
async fn process_job(
    job: Job,
    policy: JobPolicy,
    executor: Arc<dyn JobExecutor>,
    queue: Arc<dyn JobQueue>,
    alert_sink: Arc<dyn AlertSink>,
    stats: Arc<JobStatsRegistry>,
) {
    info!(state = ?JobState::Progress, "Job started");
    let started = Instant::now();
    let outcome = execute_with_limits(&job, &policy, executor.as_ref()).await;
    let elapsed = started.elapsed();

    match outcome {
        Ok(()) => {
            stats.record(job.kind(), elapsed);
            info!(
                state = ?JobState::Success,
                elapsed_ms = elapsed.as_millis() as u64,
                "Job completed"
            );
        }
        Err(e) => {
            let next_attempt = job.attempt + 1;
            if e.is_transient() && policy.retry.should_retry(next_attempt) {
                let delay = policy.retry.delay_for_attempt(job.attempt);
                warn!(
                    error = %e,
                    next_attempt,
                    delay_secs = delay.as_secs(),
                    "Job failed, scheduling retry"
                );
                let retry_job = job.next_attempt();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Err(e) = queue.enqueue(retry_job).await {
                        warn!(error = %e, "Dropping retry, queue closed");
                    }
                });
            } else {
                error!(
                    state = ?JobState::Failure,
                    error = %e,
                    attempts = next_attempt,
                    "Job failed permanently"
                );
                if policy.alert_on_final_failure {
                    let alert = final_failure_alert(&job, next_attempt, &e);
                    if let Err(send_err) = alert_sink.send(&alert).await {
                        error!(error = %send_err, "Failed to deliver job-failure alert");
                    }
                }
            }
        }
    }
}

/// Run the payload under the policy's soft and hard time limits.
///
/// The soft limit only logs; the hard limit cancels the job and surfaces
/// [`Error::HardTimeout`], which is retried as transient.
async fn execute_with_limits(
    job: &Job,
    policy: &JobPolicy,
    executor: &dyn JobExecutor,
) -> Result<()> {
    let work = executor.execute(&job.payload);
    tokio::pin!(work);

    tokio::select! {
        result = &mut work => result,
        _ = tokio::time::sleep(policy.soft_time_limit) => {
            warn!(
                soft_limit_secs = policy.soft_time_limit.as_secs(),
                "Job exceeded soft time limit"
            );
            let remaining = policy
                .hard_time_limit
                .saturating_sub(policy.soft_time_limit);
            match tokio::time::timeout(remaining, &mut work).await {
                Ok(result) => result,
                Err(_) => Err(Error::HardTimeout(policy.hard_time_limit)),
            }
        }
    }
}

fn final_failure_alert(job: &Job, attempts: u32, error: &Error) -> Alert {
    Alert::new(
        AlertLevel::Critical,
        "Background job failed",
        format!("Job {} gave up after {} attempts", job.kind(), attempts),
    )
    .detail("job_id", job.id.to_string())
    .detail("kind", job.kind().as_str())
    .detail("attempts", attempts.to_string())
    .detail("error", error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::InMemoryJobQueue;
    use crate::retry::{RetryPolicy, RetryStrategy};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct RecordingExecutor {
        calls: AtomicU32,
        fail_first: u32,
        transient: bool,
    }

    impl RecordingExecutor {
        fn succeeding() -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail_first: 0,
                transient: true,
            }
        }

        fn failing_first(n: u32, transient: bool) -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail_first: n,
                transient,
            }
        }
    }

    #[async_trait]
    impl JobExecutor for RecordingExecutor {
        async fn execute(&self, _payload: &JobPayload) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                if self.transient {
                    Err(Error::Storage(pulse_storage::Error::Database(
                        sqlx::Error::PoolTimedOut,
                    )))
                } else {
                    Err(Error::Storage(pulse_storage::Error::Validation(
                        "bad payload".into(),
                    )))
                }
            } else {
                Ok(())
            }
        }
    }

    struct SlowExecutor;

    #[async_trait]
    impl JobExecutor for SlowExecutor {
        async fn execute(&self, _payload: &JobPayload) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        alerts: Mutex<Vec<Alert>>,
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        async fn send(&self, alert: &Alert) -> pulse_core::Result<()> {
            self.alerts.lock().unwrap().push(alert.clone());
            Ok(())
        }
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            strategy: RetryStrategy::Fixed,
            backoff_multiplier: 2.0,
        }
    }

    fn runner_with(
        executor: Arc<dyn JobExecutor>,
        sink: Arc<RecordingSink>,
        policy: JobPolicy,
    ) -> (JobRunner, Arc<InMemoryJobQueue>) {
        let queue = Arc::new(InMemoryJobQueue::new(16));
        let mut runner = JobRunner::new(Arc::clone(&queue) as Arc<dyn JobQueue>, executor, sink);
        for kind in JobKind::all() {
            runner = runner.with_policy(*kind, policy.clone());
        }
        (runner, queue)
    }

    fn fast_policy() -> JobPolicy {
        JobPolicy {
            max_concurrency: 2,
            rate_per_second: 1000,
            retry: fast_retry(3),
            soft_time_limit: Duration::from_millis(50),
            hard_time_limit: Duration::from_millis(100),
            alert_on_final_failure: false,
        }
    }

    #[tokio::test]
    async fn runs_jobs_and_records_stats() {
        let executor = Arc::new(RecordingExecutor::succeeding());
        let sink = Arc::new(RecordingSink::default());
        let (runner, queue) = runner_with(executor.clone(), sink, fast_policy());

        queue
            .enqueue(Job::new(JobPayload::FreshnessCheck))
            .await
            .unwrap();
        queue.close();
        runner.run().await.unwrap();

        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
        assert_eq!(runner.stats().runs(JobKind::FreshnessCheck), 1);
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let executor = Arc::new(RecordingExecutor::failing_first(1, true));
        let sink = Arc::new(RecordingSink::default());
        let (runner, queue) = runner_with(executor.clone(), sink, fast_policy());

        queue
            .enqueue(Job::new(JobPayload::FreshnessCheck))
            .await
            .unwrap();

        // Close the queue once the retry has had time to land.
        let closer = Arc::clone(&queue);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            closer.close();
        });
        runner.run().await.unwrap();

        assert_eq!(executor.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried_and_alerts() {
        let executor = Arc::new(RecordingExecutor::failing_first(10, false));
        let sink = Arc::new(RecordingSink::default());
        let mut policy = fast_policy();
        policy.alert_on_final_failure = true;
        let (runner, queue) = runner_with(executor.clone(), sink.clone(), policy);

        queue
            .enqueue(Job::new(JobPayload::AnomalyDetection { execution_id: 9 }))
            .await
            .unwrap();
        queue.close();
        runner.run().await.unwrap();

        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
        let alerts = sink.alerts.lock().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].title, "Background job failed");
        assert_eq!(
            alerts[0].details.get("kind").map(String::as_str),
            Some("anomaly_detection")
        );
    }

    #[tokio::test]
    async fn retries_exhaust_then_alert() {
        let executor = Arc::new(RecordingExecutor::failing_first(10, true));
        let sink = Arc::new(RecordingSink::default());
        let mut policy = fast_policy();
        policy.retry = fast_retry(2);
        policy.alert_on_final_failure = true;
        let (runner, queue) = runner_with(executor.clone(), sink.clone(), policy);

        queue
            .enqueue(Job::new(JobPayload::ClosureRebuild {
                pipeline_id: 1,
                seed: vec![1, 2],
            }))
            .await
            .unwrap();
        let closer = Arc::clone(&queue);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            closer.close();
        });
        runner.run().await.unwrap();

        assert_eq!(executor.calls.load(Ordering::SeqCst), 2);
        assert_eq!(sink.alerts.lock().unwrap().len(), 1);
    }

    struct OrderRecordingExecutor {
        order: Mutex<Vec<JobKind>>,
    }

    #[async_trait]
    impl JobExecutor for OrderRecordingExecutor {
        async fn execute(&self, payload: &JobPayload) -> Result<()> {
            self.order.lock().unwrap().push(payload.kind());
            Ok(())
        }
    }

    #[tokio::test]
    async fn throttled_kind_does_not_block_other_kinds() {
        let executor = Arc::new(OrderRecordingExecutor {
            order: Mutex::new(Vec::new()),
        });
        let sink = Arc::new(RecordingSink::default());
        let mut throttled = fast_policy();
        throttled.rate_per_second = 1;
        let (runner, queue) = runner_with(executor.clone(), sink, fast_policy());
        let runner = runner.with_policy(JobKind::ClosureRebuild, throttled);

        // Two rebuilds against a 1/s quota; the second waits out the bucket.
        for _ in 0..2 {
            queue
                .enqueue(Job::new(JobPayload::ClosureRebuild {
                    pipeline_id: 1,
                    seed: vec![],
                }))
                .await
                .unwrap();
        }
        queue
            .enqueue(Job::new(JobPayload::FreshnessCheck))
            .await
            .unwrap();
        queue.close();
        runner.run().await.unwrap();

        let order = executor.order.lock().unwrap();
        assert_eq!(order.len(), 3);
        let freshness_at = order
            .iter()
            .position(|k| *k == JobKind::FreshnessCheck)
            .unwrap();
        assert!(
            freshness_at < 2,
            "freshness ran after the rebuild rate window: {order:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn hard_time_limit_cancels_the_job() {
        let policy = fast_policy();
        let result = execute_with_limits(
            &Job::new(JobPayload::FreshnessCheck),
            &policy,
            &SlowExecutor,
        )
        .await;
        assert!(matches!(result, Err(Error::HardTimeout(_))));
    }
}
