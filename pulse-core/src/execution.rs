//! Derived execution fields
//!
//! Duration, throughput and the hour-of-day bucket are derived once when an
//! execution ends and stored alongside the reported counters.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Status of an execution at the moment a timeliness log is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// UTC hour-of-day bucket of a start timestamp, used to compare like
/// executions across days.
pub fn hour_recorded(start_date: DateTime<Utc>) -> i16 {
    start_date.hour() as i16
}

/// Wall-clock duration of an execution in whole seconds.
pub fn derive_duration_seconds(start_date: DateTime<Utc>, end_date: DateTime<Utc>) -> i64 {
    (end_date - start_date).num_seconds()
}

/// Rows per second, rounded to 4 decimal places; 0 when the duration is not
/// positive.
pub fn derive_throughput(total_rows: i64, duration_seconds: i64) -> f64 {
    if duration_seconds <= 0 {
        return 0.0;
    }
    let raw = total_rows as f64 / duration_seconds as f64;
    (raw * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn hour_bucket_is_utc_hour() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 23, 59, 0).unwrap();
        assert_eq!(hour_recorded(start), 23);
    }

    #[test]
    fn duration_in_whole_seconds() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 3, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 3, 1, 3, 10, 30).unwrap();
        assert_eq!(derive_duration_seconds(start, end), 630);
    }

    #[test]
    fn throughput_rounds_to_four_places() {
        assert_eq!(derive_throughput(1_000, 3), 333.3333);
        assert_eq!(derive_throughput(1, 3), 0.3333);
    }

    #[test]
    fn throughput_is_zero_for_nonpositive_duration() {
        assert_eq!(derive_throughput(500, 0), 0.0);
        assert_eq!(derive_throughput(500, -5), 0.0);
    }
}
