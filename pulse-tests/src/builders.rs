//! Fluent builders for test objects

use chrono::{DateTime, Duration, TimeZone, Utc};
use pulse_core::AnomalyFlags;
use pulse_core::MetricField;
use pulse_storage::models::{ExecutionModel, TimelinessCandidateRow};
use sqlx::types::Json;

/// Builder for [`ExecutionModel`] rows used in baseline and evaluator tests.
pub struct ExecutionBuilder {
    execution: ExecutionModel,
}

impl ExecutionBuilder {
    pub fn new(id: i64) -> Self {
        let start = Utc.with_ymd_and_hms(2026, 6, 1, 3, 0, 0).unwrap();
        Self {
            execution: ExecutionModel {
                id,
                pipeline_id: 1,
                parent_execution_id: None,
                start_date: start,
                end_date: Some(start + Duration::minutes(10)),
                duration_seconds: Some(600),
                throughput: None,
                inserts: None,
                updates: None,
                soft_deletes: None,
                total_rows: None,
                completed_successfully: Some(true),
                hour_recorded: 3,
                anomaly_flags: Json(AnomalyFlags::new()),
            },
        }
    }

    pub fn pipeline(mut self, pipeline_id: i64) -> Self {
        self.execution.pipeline_id = pipeline_id;
        self
    }

    pub fn started_at(mut self, start: DateTime<Utc>) -> Self {
        self.execution.hour_recorded = pulse_core::hour_recorded(start);
        self.execution.start_date = start;
        self
    }

    /// Set the end date and re-derive the duration
    pub fn ended_at(mut self, end: DateTime<Utc>) -> Self {
        self.execution.duration_seconds = Some(pulse_core::derive_duration_seconds(
            self.execution.start_date,
            end,
        ));
        self.execution.end_date = Some(end);
        self
    }

    pub fn total_rows(mut self, rows: i64) -> Self {
        self.execution.total_rows = Some(rows);
        self
    }

    pub fn failed(mut self) -> Self {
        self.execution.completed_successfully = Some(false);
        self
    }

    pub fn flagged(mut self, metric: MetricField) -> Self {
        self.execution.anomaly_flags.0.set(metric);
        self
    }

    pub fn build(self) -> ExecutionModel {
        self.execution
    }
}

/// Builder for the joined rows the timeliness evaluator consumes.
pub struct TimelinessCandidateBuilder {
    row: TimelinessCandidateRow,
}

impl TimelinessCandidateBuilder {
    pub fn new(execution_id: i64) -> Self {
        let start = Utc.with_ymd_and_hms(2026, 6, 1, 3, 0, 0).unwrap();
        Self {
            row: TimelinessCandidateRow {
                execution_id,
                pipeline_id: 1,
                pipeline_name: "orders-nightly".to_string(),
                start_date: start,
                end_date: None,
                duration_seconds: None,
                completed_successfully: None,
                child_number: None,
                child_datepart: None,
                parent_number: None,
                parent_datepart: None,
            },
        }
    }

    pub fn started_at(mut self, start: DateTime<Utc>) -> Self {
        self.row.start_date = start;
        self
    }

    pub fn completed(mut self, end: DateTime<Utc>, success: bool) -> Self {
        self.row.duration_seconds = Some((end - self.row.start_date).num_seconds());
        self.row.end_date = Some(end);
        self.row.completed_successfully = Some(success);
        self
    }

    pub fn child_threshold(mut self, number: i32, datepart: &str) -> Self {
        self.row.child_number = Some(number);
        self.row.child_datepart = Some(datepart.to_string());
        self
    }

    pub fn parent_threshold(mut self, number: i32, datepart: &str) -> Self {
        self.row.parent_number = Some(number);
        self.row.parent_datepart = Some(datepart.to_string());
        self
    }

    pub fn build(self) -> TimelinessCandidateRow {
        self.row
    }
}
