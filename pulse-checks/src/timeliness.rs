//! Timeliness evaluation
//!
//! Did each recent execution finish (or is it still running) within its
//! configured time budget? Log rows are unique per execution, so repeated
//! checks never duplicate a log or an alert.

use crate::Result;
use chrono::{DateTime, Duration, Utc};
use pulse_core::{
    resolve_threshold, Alert, AlertLevel, AlertSink, DatePart, ExecutionStatus, ThresholdSource,
    ThresholdSpec,
};
use pulse_storage::{MetricStore, NewTimelinessLog, TimelinessCandidateRow};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Outcome of evaluating one execution
#[derive(Debug, Clone, PartialEq)]
pub enum TimelinessVerdict {
    /// Neither pipeline nor pipeline type carries a complete config
    NoConfig,
    /// Execution ended unsuccessfully; timeliness does not apply
    Ignored,
    OnTime,
    Overdue {
        log: NewTimelinessLogFields,
        threshold: ThresholdSpec,
    },
}

/// Log fields computed for an overdue execution
#[derive(Debug, Clone, PartialEq)]
pub struct NewTimelinessLogFields {
    pub pipeline_execution_id: i64,
    pub actual_seconds: i64,
    pub used_child_config: bool,
    pub execution_status: ExecutionStatus,
}

fn parse_datepart(value: &Option<String>) -> Option<DatePart> {
    value.as_deref().and_then(|v| DatePart::from_str(v).ok())
}

/// Threshold resolved for the row's pipeline, independent of any verdict.
pub fn resolved_threshold(
    row: &TimelinessCandidateRow,
) -> Option<(ThresholdSpec, ThresholdSource)> {
    resolve_threshold(
        row.child_number,
        parse_datepart(&row.child_datepart),
        row.parent_number,
        parse_datepart(&row.parent_datepart),
    )
}

/// Evaluate one candidate row against the resolved threshold at `now`.
pub fn evaluate_timeliness_candidate(
    row: &TimelinessCandidateRow,
    now: DateTime<Utc>,
) -> TimelinessVerdict {
    let Some((threshold, source)) = resolved_threshold(row) else {
        return TimelinessVerdict::NoConfig;
    };

    let threshold_time = row.start_date + threshold.to_duration();
    let (overdue, actual_seconds, status) = match row.completed_successfully {
        // still running: overdue once "now" passes the budget
        None => (
            now > threshold_time,
            (now - row.start_date).num_seconds(),
            ExecutionStatus::Running,
        ),
        Some(true) => {
            let end = row.end_date.unwrap_or(now);
            let actual = row
                .duration_seconds
                .unwrap_or_else(|| (end - row.start_date).num_seconds());
            (end > threshold_time, actual, ExecutionStatus::Completed)
        }
        Some(false) => return TimelinessVerdict::Ignored,
    };

    if !overdue {
        return TimelinessVerdict::OnTime;
    }

    TimelinessVerdict::Overdue {
        log: NewTimelinessLogFields {
            pipeline_execution_id: row.execution_id,
            actual_seconds,
            used_child_config: source.is_child(),
            execution_status: status,
        },
        threshold,
    }
}

/// Report of one timeliness check run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimelinessReport {
    pub candidates: usize,
    pub overdue: usize,
    pub newly_logged: usize,
    pub skipped_no_config: usize,
    /// Pipelines whose resolved threshold exceeds the lookback window
    pub short_lookback_pipelines: usize,
}

/// Periodic timeliness check over recently started executions.
#[derive(Clone)]
pub struct TimelinessChecker {
    store: Arc<MetricStore>,
    alert_sink: Arc<dyn AlertSink>,
}

impl TimelinessChecker {
    pub fn new(store: Arc<MetricStore>, alert_sink: Arc<dyn AlertSink>) -> Self {
        Self { store, alert_sink }
    }

    /// Evaluate executions started within the last `lookback_minutes`.
    ///
    /// Alerts fire only for executions whose log row was inserted by this
    /// run.
    #[instrument(skip(self))]
    pub async fn run(&self, lookback_minutes: i64) -> Result<TimelinessReport> {
        let now = Utc::now();
        let candidates = self
            .store
            .timeliness_candidates(now - Duration::minutes(lookback_minutes))
            .await?;

        let mut report = TimelinessReport {
            candidates: candidates.len(),
            ..Default::default()
        };
        let mut logs: Vec<NewTimelinessLog> = Vec::new();
        let mut by_execution: HashMap<i64, (&TimelinessCandidateRow, ThresholdSpec)> =
            HashMap::new();
        let mut short_lookback: HashSet<i64> = HashSet::new();

        for row in &candidates {
            // A threshold longer than the lookback means overdue runs can
            // age out of the window before they are ever seen; flag the
            // config whatever the verdict turns out to be.
            if let Some((threshold, _)) = resolved_threshold(row) {
                let threshold_minutes = threshold.to_duration().num_minutes();
                if lookback_minutes < threshold_minutes && short_lookback.insert(row.pipeline_id) {
                    report.short_lookback_pipelines += 1;
                    warn!(
                        pipeline = %row.pipeline_name,
                        lookback_minutes,
                        threshold_minutes,
                        "Lookback shorter than threshold; overdue executions may be missed"
                    );
                }
            }

            match evaluate_timeliness_candidate(row, now) {
                TimelinessVerdict::NoConfig => {
                    report.skipped_no_config += 1;
                    warn!(
                        pipeline = %row.pipeline_name,
                        execution_id = row.execution_id,
                        "Skipping timeliness check: no complete threshold config"
                    );
                }
                TimelinessVerdict::Ignored | TimelinessVerdict::OnTime => {}
                TimelinessVerdict::Overdue { log, threshold } => {
                    report.overdue += 1;
                    by_execution.insert(log.pipeline_execution_id, (row, threshold));
                    logs.push(NewTimelinessLog {
                        pipeline_execution_id: log.pipeline_execution_id,
                        threshold_number: threshold.number,
                        threshold_datepart: threshold.datepart.as_str().to_string(),
                        actual_seconds: log.actual_seconds,
                        used_child_config: log.used_child_config,
                        execution_status: log.execution_status.as_str().to_string(),
                        evaluated_at: now,
                    });
                }
            }
        }

        let inserted = self.store.insert_timeliness_logs_if_absent(&logs).await?;
        report.newly_logged = inserted.len();

        for execution_id in &inserted {
            let Some((row, threshold)) = by_execution.get(execution_id) else {
                continue;
            };
            let alert = Alert::new(
                AlertLevel::Warning,
                "Pipeline execution overdue",
                format!(
                    "Execution {execution_id} of pipeline {} exceeded its budget of {} {}(s)",
                    row.pipeline_name, threshold.number, threshold.datepart
                ),
            )
            .detail("pipeline_id", row.pipeline_id.to_string())
            .detail("execution_id", execution_id.to_string())
            .detail("threshold", format!("{} {}", threshold.number, threshold.datepart));
            if let Err(e) = self.alert_sink.send(&alert).await {
                tracing::error!(execution_id, error = %e, "Timeliness alert delivery failed");
            }
        }

        info!(
            candidates = report.candidates,
            overdue = report.overdue,
            newly_logged = report.newly_logged,
            "Timeliness check complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(
        completed: Option<bool>,
        started_minutes_ago: i64,
        duration_seconds: Option<i64>,
        child: Option<(i32, &str)>,
        parent: Option<(i32, &str)>,
    ) -> (TimelinessCandidateRow, DateTime<Utc>) {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        let start = now - Duration::minutes(started_minutes_ago);
        let end = duration_seconds.map(|d| start + Duration::seconds(d));
        (
            TimelinessCandidateRow {
                execution_id: 11,
                pipeline_id: 1,
                pipeline_name: "orders".into(),
                start_date: start,
                end_date: end,
                duration_seconds,
                completed_successfully: completed,
                child_number: child.map(|(n, _)| n),
                child_datepart: child.map(|(_, d)| d.to_string()),
                parent_number: parent.map(|(n, _)| n),
                parent_datepart: parent.map(|(_, d)| d.to_string()),
            },
            now,
        )
    }

    #[test]
    fn running_overdue_when_now_passes_budget() {
        // started 2h ago, threshold 1h, still running
        let (row, now) = row(None, 120, None, Some((1, "hour")), None);
        match evaluate_timeliness_candidate(&row, now) {
            TimelinessVerdict::Overdue { log, threshold } => {
                assert_eq!(log.execution_status, ExecutionStatus::Running);
                assert_eq!(log.actual_seconds, 7_200);
                assert!(log.used_child_config);
                assert_eq!(threshold, ThresholdSpec::new(1, DatePart::Hour));
            }
            other => panic!("expected overdue, got {other:?}"),
        }
    }

    #[test]
    fn running_within_budget_is_on_time() {
        let (row, now) = row(None, 30, None, Some((1, "hour")), None);
        assert_eq!(evaluate_timeliness_candidate(&row, now), TimelinessVerdict::OnTime);
    }

    #[test]
    fn completed_overdue_uses_recorded_duration() {
        // ran 90 minutes against a 1 hour budget
        let (row, now) = row(Some(true), 180, Some(5_400), Some((1, "hour")), None);
        match evaluate_timeliness_candidate(&row, now) {
            TimelinessVerdict::Overdue { log, .. } => {
                assert_eq!(log.execution_status, ExecutionStatus::Completed);
                assert_eq!(log.actual_seconds, 5_400);
            }
            other => panic!("expected overdue, got {other:?}"),
        }
    }

    #[test]
    fn completed_within_budget_is_on_time() {
        let (row, now) = row(Some(true), 180, Some(600), Some((1, "hour")), None);
        assert_eq!(evaluate_timeliness_candidate(&row, now), TimelinessVerdict::OnTime);
    }

    #[test]
    fn failed_execution_is_ignored() {
        let (row, now) = row(Some(false), 180, Some(10_000), Some((1, "hour")), None);
        assert_eq!(evaluate_timeliness_candidate(&row, now), TimelinessVerdict::Ignored);
    }

    #[test]
    fn parent_config_used_when_child_incomplete() {
        let (row, now) = row(None, 120, None, None, Some((1, "hour")));
        match evaluate_timeliness_candidate(&row, now) {
            TimelinessVerdict::Overdue { log, .. } => assert!(!log.used_child_config),
            other => panic!("expected overdue, got {other:?}"),
        }
    }

    #[test]
    fn threshold_resolution_is_verdict_independent() {
        // On-time and failed rows still resolve; the short-lookback
        // comparison must not wait for an overdue verdict.
        let (on_time, now) = row(None, 30, None, Some((1, "hour")), None);
        assert_eq!(
            evaluate_timeliness_candidate(&on_time, now),
            TimelinessVerdict::OnTime
        );
        assert_eq!(
            resolved_threshold(&on_time).map(|(t, _)| t),
            Some(ThresholdSpec::new(1, DatePart::Hour))
        );

        let (failed, now) = row(Some(false), 180, Some(100), Some((1, "hour")), None);
        assert_eq!(
            evaluate_timeliness_candidate(&failed, now),
            TimelinessVerdict::Ignored
        );
        assert!(resolved_threshold(&failed).is_some());
    }

    #[test]
    fn no_config_skips() {
        let (row, now) = row(None, 120, None, Some((1, "bogus")), None);
        assert_eq!(evaluate_timeliness_candidate(&row, now), TimelinessVerdict::NoConfig);
    }
}
