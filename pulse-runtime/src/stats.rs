//! In-process job duration accounting
//!
//! Workers record wall-clock durations per [`JobKind`]; the runner flushes
//! the rolling averages to the `job_stats` table when its queue drains.

use crate::job::JobKind;
use crate::Result;
use dashmap::DashMap;
use pulse_storage::MetricStore;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Default, Clone, Copy)]
struct KindTotals {
    total_ms: u128,
    runs: u64,
}

/// Lock-free accumulator of per-kind run durations.
#[derive(Default)]
pub struct JobStatsRegistry {
    totals: DashMap<JobKind, KindTotals>,
}

impl JobStatsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed run of `kind`.
    pub fn record(&self, kind: JobKind, elapsed: Duration) {
        let mut entry = self.totals.entry(kind).or_default();
        entry.total_ms += elapsed.as_millis();
        entry.runs += 1;
    }

    /// Average duration in milliseconds for `kind`, if any runs were recorded.
    pub fn average_ms(&self, kind: JobKind) -> Option<f64> {
        self.totals.get(&kind).and_then(|t| {
            if t.runs == 0 {
                None
            } else {
                Some(t.total_ms as f64 / t.runs as f64)
            }
        })
    }

    /// Total recorded runs for `kind`.
    pub fn runs(&self, kind: JobKind) -> u64 {
        self.totals.get(&kind).map(|t| t.runs).unwrap_or(0)
    }

    /// Persist the current averages to the `job_stats` table.
    pub async fn flush(&self, store: &MetricStore) -> Result<()> {
        for entry in self.totals.iter() {
            let kind = *entry.key();
            let totals = *entry.value();
            if totals.runs == 0 {
                continue;
            }
            let average_ms = totals.total_ms as f64 / totals.runs as f64;
            store
                .upsert_job_stat(kind.as_str(), average_ms, totals.runs as i64)
                .await?;
            debug!(
                kind = kind.as_str(),
                average_ms, runs = totals.runs, "Flushed job stats"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_accumulate_per_kind() {
        let registry = JobStatsRegistry::new();
        registry.record(JobKind::ClosureRebuild, Duration::from_millis(100));
        registry.record(JobKind::ClosureRebuild, Duration::from_millis(300));
        registry.record(JobKind::FreshnessCheck, Duration::from_millis(50));

        assert_eq!(registry.average_ms(JobKind::ClosureRebuild), Some(200.0));
        assert_eq!(registry.runs(JobKind::ClosureRebuild), 2);
        assert_eq!(registry.average_ms(JobKind::FreshnessCheck), Some(50.0));
        assert_eq!(registry.average_ms(JobKind::AnomalyDetection), None);
    }
}
