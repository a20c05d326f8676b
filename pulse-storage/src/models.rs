//! Database models for Pulse metadata

use chrono::{DateTime, Utc};
use pulse_core::{AnomalyFlags, MetricField};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Address-type model: classifies addresses into groups
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AddressTypeModel {
    pub id: i64,
    pub name: String,
    pub group_name: String,
}

/// Address model: a named endpoint in the lineage graph
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AddressModel {
    pub id: i64,
    pub name: String,
    pub address_type_id: i64,
    pub database_name: Option<String>,
    pub schema_name: Option<String>,
    pub table_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Pipeline-type model: threshold defaults inherited by pipelines
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PipelineTypeModel {
    pub id: i64,
    pub name: String,
    pub freshness_number: Option<i32>,
    pub freshness_datepart: Option<String>,
    pub timeliness_number: Option<i32>,
    pub timeliness_datepart: Option<String>,
    pub mute_freshness_check: bool,
    pub mute_timeliness_check: bool,
}

/// Pipeline model
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PipelineModel {
    pub id: i64,
    pub name: String,
    pub pipeline_type_id: i64,
    pub active: bool,
    pub load_lineage: bool,
    pub watermark: Option<String>,
    pub next_watermark: Option<String>,
    pub last_target_insert: Option<DateTime<Utc>>,
    pub last_target_update: Option<DateTime<Utc>>,
    pub last_target_soft_delete: Option<DateTime<Utc>>,
    pub freshness_number: Option<i32>,
    pub freshness_datepart: Option<String>,
    pub timeliness_number: Option<i32>,
    pub timeliness_datepart: Option<String>,
    pub mute_freshness_check: bool,
    pub mute_timeliness_check: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lineage edge authored by a pipeline
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LineageEdgeModel {
    pub pipeline_id: i64,
    pub source_address_id: i64,
    pub target_address_id: i64,
}

/// One row of the address-lineage closure
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ClosureRowModel {
    pub source_address_id: i64,
    pub target_address_id: i64,
    pub depth: i32,
    pub lineage_path: Vec<i64>,
}

/// Closure row pending insertion
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NewClosureRow {
    pub source_address_id: i64,
    pub target_address_id: i64,
    pub depth: i32,
    pub lineage_path: Vec<i64>,
}

/// Pipeline execution model
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExecutionModel {
    pub id: i64,
    pub pipeline_id: i64,
    pub parent_execution_id: Option<i64>,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub throughput: Option<f64>,
    pub inserts: Option<i64>,
    pub updates: Option<i64>,
    pub soft_deletes: Option<i64>,
    pub total_rows: Option<i64>,
    pub completed_successfully: Option<bool>,
    pub hour_recorded: i16,
    pub anomaly_flags: sqlx::types::Json<AnomalyFlags>,
}

impl ExecutionModel {
    /// Value of the given metric field, coerced to floating point.
    pub fn metric_value(&self, field: MetricField) -> Option<f64> {
        match field {
            MetricField::Inserts => self.inserts.map(|v| v as f64),
            MetricField::Updates => self.updates.map(|v| v as f64),
            MetricField::SoftDeletes => self.soft_deletes.map(|v| v as f64),
            MetricField::TotalRows => self.total_rows.map(|v| v as f64),
            MetricField::DurationSeconds => self.duration_seconds.map(|v| v as f64),
            MetricField::Throughput => self.throughput,
        }
    }
}

/// Anomaly detection rule model
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AnomalyRuleModel {
    pub id: i64,
    pub pipeline_id: i64,
    pub metric_field: String,
    pub z_threshold: f64,
    pub lookback_days: i32,
    pub minimum_executions: i32,
    pub active: bool,
}

/// Persisted anomaly detection result
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AnomalyResultModel {
    pub id: i64,
    pub rule_id: i64,
    pub pipeline_execution_id: i64,
    pub violation_value: f64,
    pub historical_mean: f64,
    pub std_deviation_value: f64,
    pub z_threshold: f64,
    pub threshold_min_value: f64,
    pub threshold_max_value: f64,
    pub z_score: f64,
    pub context: sqlx::types::Json<serde_json::Value>,
}

/// Anomaly result pending insertion
#[derive(Debug, Clone)]
pub struct NewAnomalyResult {
    pub rule_id: i64,
    pub pipeline_execution_id: i64,
    pub violation_value: f64,
    pub historical_mean: f64,
    pub std_deviation_value: f64,
    pub z_threshold: f64,
    pub threshold_min_value: f64,
    pub threshold_max_value: f64,
    pub z_score: f64,
    pub context: serde_json::Value,
}

/// Timeliness log pending insertion
#[derive(Debug, Clone)]
pub struct NewTimelinessLog {
    pub pipeline_execution_id: i64,
    pub threshold_number: i32,
    pub threshold_datepart: String,
    pub actual_seconds: i64,
    pub used_child_config: bool,
    pub execution_status: String,
    pub evaluated_at: DateTime<Utc>,
}

/// Freshness log pending insertion
#[derive(Debug, Clone)]
pub struct NewFreshnessLog {
    pub pipeline_id: i64,
    pub last_dml_timestamp: DateTime<Utc>,
    pub used_child_config: bool,
    pub evaluated_at: DateTime<Utc>,
}

/// Natural key of a freshness log, reported back for alerting
#[derive(Debug, Clone, PartialEq, Eq, Hash, FromRow)]
pub struct FreshnessLogKey {
    pub pipeline_id: i64,
    pub last_dml_timestamp: DateTime<Utc>,
}

/// Execution joined with its pipeline's resolved-threshold inputs, as read
/// by the timeliness evaluator
#[derive(Debug, Clone, FromRow)]
pub struct TimelinessCandidateRow {
    pub execution_id: i64,
    pub pipeline_id: i64,
    pub pipeline_name: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub completed_successfully: Option<bool>,
    pub child_number: Option<i32>,
    pub child_datepart: Option<String>,
    pub parent_number: Option<i32>,
    pub parent_datepart: Option<String>,
}

/// Pipeline joined with its threshold inputs and DML timestamps, as read by
/// the freshness evaluator
#[derive(Debug, Clone, FromRow)]
pub struct FreshnessCandidateRow {
    pub pipeline_id: i64,
    pub pipeline_name: String,
    pub last_target_insert: Option<DateTime<Utc>>,
    pub last_target_update: Option<DateTime<Utc>>,
    pub last_target_soft_delete: Option<DateTime<Utc>>,
    pub child_number: Option<i32>,
    pub child_datepart: Option<String>,
    pub parent_number: Option<i32>,
    pub parent_datepart: Option<String>,
}

impl FreshnessCandidateRow {
    /// Latest DML timestamp across inserts, updates and soft deletes,
    /// ignoring nulls.
    pub fn max_dml(&self) -> Option<DateTime<Utc>> {
        [
            self.last_target_insert,
            self.last_target_update,
            self.last_target_soft_delete,
        ]
        .into_iter()
        .flatten()
        .max()
    }
}

/// Per-kind job duration aggregate persisted for diagnostics
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobStatModel {
    pub job_kind: String,
    pub average_duration_ms: f64,
    pub runs: i64,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn max_dml_ignores_nulls() {
        let t1 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let row = FreshnessCandidateRow {
            pipeline_id: 1,
            pipeline_name: "p".into(),
            last_target_insert: Some(t1),
            last_target_update: None,
            last_target_soft_delete: Some(t2),
            child_number: None,
            child_datepart: None,
            parent_number: None,
            parent_datepart: None,
        };
        assert_eq!(row.max_dml(), Some(t2));
    }

    #[test]
    fn max_dml_none_when_all_null() {
        let row = FreshnessCandidateRow {
            pipeline_id: 1,
            pipeline_name: "p".into(),
            last_target_insert: None,
            last_target_update: None,
            last_target_soft_delete: None,
            child_number: None,
            child_datepart: None,
            parent_number: None,
            parent_datepart: None,
        };
        assert_eq!(row.max_dml(), None);
    }
}
