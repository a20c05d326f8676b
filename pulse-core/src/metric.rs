//! Per-execution metric fields and anomaly flags

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Numeric fields of a pipeline execution that anomaly rules can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricField {
    Inserts,
    Updates,
    SoftDeletes,
    TotalRows,
    DurationSeconds,
    Throughput,
}

impl MetricField {
    /// Column / flag-key name for this metric
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricField::Inserts => "inserts",
            MetricField::Updates => "updates",
            MetricField::SoftDeletes => "soft_deletes",
            MetricField::TotalRows => "total_rows",
            MetricField::DurationSeconds => "duration_seconds",
            MetricField::Throughput => "throughput",
        }
    }

    /// All fields a rule may reference
    pub fn all() -> &'static [MetricField] {
        &[
            MetricField::Inserts,
            MetricField::Updates,
            MetricField::SoftDeletes,
            MetricField::TotalRows,
            MetricField::DurationSeconds,
            MetricField::Throughput,
        ]
    }
}

impl std::fmt::Display for MetricField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetricField {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "inserts" => Ok(MetricField::Inserts),
            "updates" => Ok(MetricField::Updates),
            "soft_deletes" => Ok(MetricField::SoftDeletes),
            "total_rows" => Ok(MetricField::TotalRows),
            "duration_seconds" => Ok(MetricField::DurationSeconds),
            "throughput" => Ok(MetricField::Throughput),
            other => Err(crate::Error::UnknownMetricField(other.to_string())),
        }
    }
}

/// Per-metric anomaly flags carried on an execution.
///
/// Stored as jsonb; only metrics that have been flagged appear as keys.
/// Absent keys mean "never evaluated or never flagged".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnomalyFlags(pub BTreeMap<String, bool>);

impl AnomalyFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the given metric is currently flagged
    pub fn is_flagged(&self, field: MetricField) -> bool {
        self.0.get(field.as_str()).copied().unwrap_or(false)
    }

    /// Mark a metric as anomalous
    pub fn set(&mut self, field: MetricField) {
        self.0.insert(field.as_str().to_string(), true);
    }

    /// Clear a metric's flag. Returns whether the flag was previously set.
    pub fn unset(&mut self, field: MetricField) -> bool {
        let was = self.is_flagged(field);
        self.0.insert(field.as_str().to_string(), false);
        was
    }

    /// Metrics currently flagged true
    pub fn flagged(&self) -> Vec<MetricField> {
        MetricField::all()
            .iter()
            .copied()
            .filter(|f| self.is_flagged(*f))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn round_trips_field_names() {
        for field in MetricField::all() {
            assert_eq!(MetricField::from_str(field.as_str()).unwrap(), *field);
        }
    }

    #[test]
    fn rejects_unknown_field() {
        assert!(MetricField::from_str("row_count").is_err());
    }

    #[test]
    fn flags_default_to_unflagged() {
        let flags = AnomalyFlags::new();
        assert!(!flags.is_flagged(MetricField::TotalRows));
        assert!(flags.flagged().is_empty());
    }

    #[test]
    fn set_and_unset() {
        let mut flags = AnomalyFlags::new();
        flags.set(MetricField::TotalRows);
        flags.set(MetricField::Throughput);
        assert!(flags.is_flagged(MetricField::TotalRows));
        assert_eq!(
            flags.flagged(),
            vec![MetricField::TotalRows, MetricField::Throughput]
        );

        assert!(flags.unset(MetricField::TotalRows));
        assert!(!flags.is_flagged(MetricField::TotalRows));
        // unsetting an unflagged metric reports false
        assert!(!flags.unset(MetricField::Inserts));
    }
}
