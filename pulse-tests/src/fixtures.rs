//! Test data factories for Pulse models
//!
//! Pre-built models with sensible defaults; tweak fields after construction
//! or reach for the builders when a test needs more control.

use chrono::{TimeZone, Utc};
use pulse_core::AnomalyFlags;
use pulse_storage::models::{
    AnomalyRuleModel, ExecutionModel, PipelineModel, PipelineTypeModel,
};
use sqlx::types::Json;

/// Pipeline fixture factories
pub mod pipeline {
    use super::*;

    pub fn simple() -> PipelineModel {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        PipelineModel {
            id: 1,
            name: "orders-nightly".to_string(),
            pipeline_type_id: 1,
            active: true,
            load_lineage: false,
            watermark: None,
            next_watermark: None,
            last_target_insert: None,
            last_target_update: None,
            last_target_soft_delete: None,
            freshness_number: None,
            freshness_datepart: None,
            timeliness_number: None,
            timeliness_datepart: None,
            mute_freshness_check: false,
            mute_timeliness_check: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn named(name: &str) -> PipelineModel {
        let mut p = simple();
        p.name = name.to_string();
        p
    }

    /// Pipeline still accepting lineage submissions
    pub fn loading_lineage() -> PipelineModel {
        let mut p = simple();
        p.load_lineage = true;
        p
    }
}

/// Pipeline type fixture factories
pub mod pipeline_type {
    use super::*;

    pub fn simple() -> PipelineTypeModel {
        PipelineTypeModel {
            id: 1,
            name: "extract-load".to_string(),
            freshness_number: None,
            freshness_datepart: None,
            timeliness_number: None,
            timeliness_datepart: None,
            mute_freshness_check: false,
            mute_timeliness_check: false,
        }
    }

    /// Type-level thresholds set for both checks
    pub fn with_thresholds() -> PipelineTypeModel {
        let mut t = simple();
        t.freshness_number = Some(1);
        t.freshness_datepart = Some("day".to_string());
        t.timeliness_number = Some(2);
        t.timeliness_datepart = Some("hour".to_string());
        t
    }
}

/// Execution fixture factories
pub mod execution {
    use super::*;

    /// A completed, successful ten-minute run
    pub fn completed(id: i64) -> ExecutionModel {
        let start = Utc.with_ymd_and_hms(2026, 6, 1, 3, 0, 0).unwrap();
        let end = start + chrono::Duration::minutes(10);
        ExecutionModel {
            id,
            pipeline_id: 1,
            parent_execution_id: None,
            start_date: start,
            end_date: Some(end),
            duration_seconds: Some(600),
            throughput: Some(100.0),
            inserts: Some(60_000),
            updates: None,
            soft_deletes: None,
            total_rows: Some(60_000),
            completed_successfully: Some(true),
            hour_recorded: 3,
            anomaly_flags: Json(AnomalyFlags::new()),
        }
    }

    /// A run that is still open
    pub fn running(id: i64) -> ExecutionModel {
        let mut e = completed(id);
        e.end_date = None;
        e.duration_seconds = None;
        e.throughput = None;
        e.inserts = None;
        e.total_rows = None;
        e.completed_successfully = None;
        e
    }
}

/// Anomaly rule fixture factories
pub mod rule {
    use super::*;

    pub fn total_rows(pipeline_id: i64) -> AnomalyRuleModel {
        AnomalyRuleModel {
            id: 1,
            pipeline_id,
            metric_field: "total_rows".to_string(),
            z_threshold: 3.0,
            lookback_days: 30,
            minimum_executions: 5,
            active: true,
        }
    }
}
