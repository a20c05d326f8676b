//! Ingest payload and response types
//!
//! JSON-shaped structs a transport adapter (HTTP handler, message consumer)
//! deserializes requests into and serializes responses from.

use chrono::{DateTime, Utc};
use pulse_core::{DatePart, MetricField};
use serde::{Deserialize, Serialize};

/// A `(number, datepart)` threshold as submitted by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub number: i32,
    pub datepart: DatePart,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineUpsertRequest {
    pub name: String,
    pub pipeline_type_name: String,
    #[serde(default)]
    pub next_watermark: Option<String>,
    #[serde(default)]
    pub freshness: Option<ThresholdConfig>,
    #[serde(default)]
    pub timeliness: Option<ThresholdConfig>,
}

/// Returned from `pipeline.upsert`; `watermark` lets resumable ETL pick up
/// where the last successful run left off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineUpsertResponse {
    pub id: i64,
    pub active: bool,
    pub load_lineage: bool,
    pub watermark: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStartRequest {
    pub pipeline_id: i64,
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub watermark: Option<String>,
    #[serde(default)]
    pub next_watermark: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExecutionStartResponse {
    pub id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEndRequest {
    pub id: i64,
    pub end_date: DateTime<Utc>,
    pub completed_successfully: bool,
    #[serde(default)]
    pub inserts: Option<i64>,
    #[serde(default)]
    pub updates: Option<i64>,
    #[serde(default)]
    pub soft_deletes: Option<i64>,
    #[serde(default)]
    pub total_rows: Option<i64>,
}

/// One endpoint in a lineage submission.
///
/// Address types are get-or-created alongside the addresses; name parsing
/// into database/schema/table parts keys off the type's group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressSpec {
    pub name: String,
    pub address_type_name: String,
    pub address_type_group: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineageSubmitRequest {
    pub pipeline_id: i64,
    pub sources: Vec<AddressSpec>,
    pub targets: Vec<AddressSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineageSubmitResponse {
    /// Edges written (cartesian product after dedup)
    pub edge_count: usize,
    /// Address ids seeding the enqueued closure rebuild
    pub seed_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnflagRequest {
    pub pipeline_id: i64,
    pub execution_id: i64,
    pub metrics: Vec<MetricField>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_fields_default_when_absent() {
        let req: ExecutionStartRequest = serde_json::from_str(
            r#"{"pipeline_id": 3, "start_date": "2026-06-01T03:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(req.pipeline_id, 3);
        assert!(req.parent_id.is_none());
        assert!(req.watermark.is_none());
    }

    #[test]
    fn threshold_datepart_uses_snake_case() {
        let config: ThresholdConfig =
            serde_json::from_str(r#"{"number": 2, "datepart": "hour"}"#).unwrap();
        assert_eq!(config.datepart, DatePart::Hour);
    }
}
