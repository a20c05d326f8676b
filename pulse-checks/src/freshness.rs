//! Freshness evaluation
//!
//! Has each pipeline's target data been modified recently enough? The most
//! recent of the pipeline's `last_target_*` timestamps is compared against
//! the resolved threshold; failures are logged once per
//! `(pipeline, last_dml_timestamp)` pair.

use crate::Result;
use chrono::{DateTime, Utc};
use pulse_core::{resolve_threshold, Alert, AlertLevel, AlertSink, DatePart, ThresholdSpec};
use pulse_storage::{FreshnessCandidateRow, MetricStore, NewFreshnessLog};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// One pipeline failing its freshness threshold
#[derive(Debug, Clone, PartialEq)]
pub struct FreshnessFailure {
    pub pipeline_id: i64,
    pub pipeline_name: String,
    pub last_dml_timestamp: DateTime<Utc>,
    pub threshold: ThresholdSpec,
    pub used_child_config: bool,
}

/// Outcome of evaluating one candidate
#[derive(Debug, Clone, PartialEq)]
pub enum FreshnessVerdict {
    /// No DML timestamp has ever been recorded
    NeverLoaded,
    /// Neither pipeline nor pipeline type carries a complete config
    NoConfig,
    Fresh,
    Stale(FreshnessFailure),
}

fn parse_datepart(value: &Option<String>) -> Option<DatePart> {
    value.as_deref().and_then(|v| DatePart::from_str(v).ok())
}

/// Evaluate one candidate row at `now`.
pub fn evaluate_freshness_candidate(
    row: &FreshnessCandidateRow,
    now: DateTime<Utc>,
) -> FreshnessVerdict {
    let Some(max_dml) = row.max_dml() else {
        return FreshnessVerdict::NeverLoaded;
    };

    let Some((threshold, source)) = resolve_threshold(
        row.child_number,
        parse_datepart(&row.child_datepart),
        row.parent_number,
        parse_datepart(&row.parent_datepart),
    ) else {
        return FreshnessVerdict::NoConfig;
    };

    if max_dml + threshold.to_duration() < now {
        FreshnessVerdict::Stale(FreshnessFailure {
            pipeline_id: row.pipeline_id,
            pipeline_name: row.pipeline_name.clone(),
            last_dml_timestamp: max_dml,
            threshold,
            used_child_config: source.is_child(),
        })
    } else {
        FreshnessVerdict::Fresh
    }
}

/// Report of one freshness check run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FreshnessReport {
    pub candidates: usize,
    pub stale: usize,
    pub newly_logged: usize,
    pub skipped_no_config: usize,
    pub skipped_never_loaded: usize,
}

/// Periodic freshness check over all unmuted pipelines.
#[derive(Clone)]
pub struct FreshnessChecker {
    store: Arc<MetricStore>,
    alert_sink: Arc<dyn AlertSink>,
}

impl FreshnessChecker {
    pub fn new(store: Arc<MetricStore>, alert_sink: Arc<dyn AlertSink>) -> Self {
        Self { store, alert_sink }
    }

    /// Evaluate every eligible pipeline, log new failures, and alert with
    /// the full failing set.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<FreshnessReport> {
        let now = Utc::now();
        let candidates = self.store.freshness_candidates().await?;

        let mut report = FreshnessReport {
            candidates: candidates.len(),
            ..Default::default()
        };
        let mut failures: Vec<FreshnessFailure> = Vec::new();
        for row in &candidates {
            match evaluate_freshness_candidate(row, now) {
                FreshnessVerdict::NeverLoaded => report.skipped_never_loaded += 1,
                FreshnessVerdict::NoConfig => {
                    report.skipped_no_config += 1;
                    warn!(
                        pipeline = %row.pipeline_name,
                        "Skipping freshness check: no complete threshold config"
                    );
                }
                FreshnessVerdict::Fresh => {}
                FreshnessVerdict::Stale(failure) => {
                    report.stale += 1;
                    failures.push(failure);
                }
            }
        }

        let logs: Vec<NewFreshnessLog> = failures
            .iter()
            .map(|f| NewFreshnessLog {
                pipeline_id: f.pipeline_id,
                last_dml_timestamp: f.last_dml_timestamp,
                used_child_config: f.used_child_config,
                evaluated_at: now,
            })
            .collect();
        let inserted = self.store.insert_freshness_logs_if_absent(&logs).await?;
        report.newly_logged = inserted.len();

        if !failures.is_empty() {
            let mut alert = Alert::new(
                AlertLevel::Warning,
                "Pipelines failing freshness",
                format!("{} pipeline(s) have stale target data", failures.len()),
            )
            .detail("newly_logged", report.newly_logged.to_string());
            for failure in &failures {
                alert = alert.detail(
                    failure.pipeline_name.clone(),
                    format!(
                        "last DML {}, threshold {} {}",
                        failure.last_dml_timestamp, failure.threshold.number, failure.threshold.datepart
                    ),
                );
            }
            if let Err(e) = self.alert_sink.send(&alert).await {
                tracing::error!(error = %e, "Freshness alert delivery failed");
            }
        }

        info!(
            candidates = report.candidates,
            stale = report.stale,
            newly_logged = report.newly_logged,
            "Freshness check complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn row(
        insert_days_ago: Option<i64>,
        update_days_ago: Option<i64>,
        child: Option<(i32, &str)>,
        parent: Option<(i32, &str)>,
    ) -> (FreshnessCandidateRow, DateTime<Utc>) {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        (
            FreshnessCandidateRow {
                pipeline_id: 1,
                pipeline_name: "orders".into(),
                last_target_insert: insert_days_ago.map(|d| now - Duration::days(d)),
                last_target_update: update_days_ago.map(|d| now - Duration::days(d)),
                last_target_soft_delete: None,
                child_number: child.map(|(n, _)| n),
                child_datepart: child.map(|(_, d)| d.to_string()),
                parent_number: parent.map(|(n, _)| n),
                parent_datepart: parent.map(|(_, d)| d.to_string()),
            },
            now,
        )
    }

    #[test]
    fn stale_when_max_dml_older_than_threshold() {
        // parent config (1 day), last insert 2 days ago
        let (row, now) = row(Some(2), None, None, Some((1, "day")));
        match evaluate_freshness_candidate(&row, now) {
            FreshnessVerdict::Stale(failure) => {
                assert!(!failure.used_child_config);
                assert_eq!(failure.threshold, ThresholdSpec::new(1, DatePart::Day));
                assert_eq!(failure.last_dml_timestamp, now - Duration::days(2));
            }
            other => panic!("expected stale, got {other:?}"),
        }
    }

    #[test]
    fn fresh_when_recent_dml_exists() {
        // update 1 day ago beats insert 5 days ago against a 2 day budget
        let (row, now) = row(Some(5), Some(1), None, Some((2, "day")));
        assert_eq!(evaluate_freshness_candidate(&row, now), FreshnessVerdict::Fresh);
    }

    #[test]
    fn child_config_overrides_parent() {
        // child allows 3 days, parent only 1; data is 2 days old
        let (row, now) = row(Some(2), None, Some((3, "day")), Some((1, "day")));
        assert_eq!(evaluate_freshness_candidate(&row, now), FreshnessVerdict::Fresh);
    }

    #[test]
    fn never_loaded_pipelines_are_skipped() {
        let (row, now) = row(None, None, None, Some((1, "day")));
        assert_eq!(
            evaluate_freshness_candidate(&row, now),
            FreshnessVerdict::NeverLoaded
        );
    }

    #[test]
    fn missing_config_skips() {
        let (row, now) = row(Some(2), None, None, None);
        assert_eq!(evaluate_freshness_candidate(&row, now), FreshnessVerdict::NoConfig);
    }
}
