//! Ingest operations
//!
//! Pipeline/execution bookkeeping writes synchronously; closure rebuilds,
//! anomaly detection and the periodic checks are enqueued for the runner.

use crate::types::*;
use crate::Result;
use pulse_anomaly::detector::AnomalyDetector;
use pulse_runtime::{Job, JobPayload, JobQueue};
use pulse_storage::{ExecutionCounters, MetricStore};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, instrument};

/// The ingest boundary: one instance per process, shared by transports.
pub struct IngestService {
    store: Arc<MetricStore>,
    queue: Arc<dyn JobQueue>,
    detector: Arc<AnomalyDetector>,
}

impl IngestService {
    pub fn new(
        store: Arc<MetricStore>,
        queue: Arc<dyn JobQueue>,
        detector: Arc<AnomalyDetector>,
    ) -> Self {
        Self {
            store,
            queue,
            detector,
        }
    }

    /// `pipeline.upsert`: register or update a pipeline by name.
    ///
    /// The pipeline type is get-or-created; threshold overrides only
    /// overwrite stored values when provided. Returns the current watermark
    /// so resumable ETL can pick up where the last successful run left off.
    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn pipeline_upsert(
        &self,
        request: PipelineUpsertRequest,
    ) -> Result<PipelineUpsertResponse> {
        if request.name.trim().is_empty() {
            return Err(crate::Error::Validation(
                "pipeline name cannot be empty".to_string(),
            ));
        }

        let (pipeline_type, created) = self
            .store
            .get_or_create_pipeline_type(&request.pipeline_type_name)
            .await?;
        if created {
            info!(name = %pipeline_type.name, "Created pipeline type");
        }

        let pipeline = self
            .store
            .upsert_pipeline(
                &request.name,
                pipeline_type.id,
                request.next_watermark.as_deref(),
                request.freshness.map(|f| f.number),
                request.freshness.map(|f| f.datepart.as_str()),
                request.timeliness.map(|t| t.number),
                request.timeliness.map(|t| t.datepart.as_str()),
            )
            .await?;

        Ok(PipelineUpsertResponse {
            id: pipeline.id,
            active: pipeline.active,
            load_lineage: pipeline.load_lineage,
            watermark: pipeline.watermark,
        })
    }

    /// `execution.start`: open an execution for a pipeline.
    #[instrument(skip(self, request), fields(pipeline_id = request.pipeline_id))]
    pub async fn execution_start(
        &self,
        request: ExecutionStartRequest,
    ) -> Result<ExecutionStartResponse> {
        // Surfaces NotFound for dangling pipeline ids before touching rows.
        let pipeline = self.store.get_pipeline(request.pipeline_id).await?;
        if !pipeline.active {
            return Err(crate::Error::Validation(format!(
                "pipeline {} is inactive",
                pipeline.id
            )));
        }

        let execution = self
            .store
            .create_execution(
                request.pipeline_id,
                request.start_date,
                request.parent_id,
                request.watermark.as_deref(),
                request.next_watermark.as_deref(),
            )
            .await?;

        Ok(ExecutionStartResponse { id: execution.id })
    }

    /// `execution.end`: close an execution and trigger downstream work.
    ///
    /// Derives duration and throughput, applies the pipeline side effects
    /// (watermark advance, `last_target_*`, `load_lineage` clear), then
    /// enqueues ancestry maintenance and anomaly detection.
    #[instrument(skip(self, request), fields(execution_id = request.id))]
    pub async fn execution_end(&self, request: ExecutionEndRequest) -> Result<()> {
        let execution = self
            .store
            .complete_execution(
                request.id,
                request.end_date,
                request.completed_successfully,
                ExecutionCounters {
                    inserts: request.inserts,
                    updates: request.updates,
                    soft_deletes: request.soft_deletes,
                    total_rows: request.total_rows,
                },
            )
            .await?;

        self.queue
            .enqueue(Job::new(JobPayload::ExecutionAncestry {
                execution_id: execution.id,
                parent_execution_id: execution.parent_execution_id,
            }))
            .await?;
        self.queue
            .enqueue(Job::new(JobPayload::AnomalyDetection {
                execution_id: execution.id,
            }))
            .await?;

        info!(
            execution_id = execution.id,
            pipeline_id = execution.pipeline_id,
            completed_successfully = request.completed_successfully,
            "Execution ended"
        );
        Ok(())
    }

    /// `lineage.submit`: replace the pipeline's edges with the cartesian
    /// product of sources and targets, then enqueue the closure rebuild.
    ///
    /// Accepted only while the pipeline's `load_lineage` flag is set; the
    /// flag clears when the run ends, making lineage submission single-shot
    /// per load cycle. The rebuild seed is the union of the pre-existing and
    /// new address sets so stale closure rows get swept.
    #[instrument(skip(self, request), fields(pipeline_id = request.pipeline_id))]
    pub async fn lineage_submit(
        &self,
        request: LineageSubmitRequest,
    ) -> Result<LineageSubmitResponse> {
        let pipeline = self.store.get_pipeline(request.pipeline_id).await?;
        if !pipeline.load_lineage {
            return Err(crate::Error::Validation(format!(
                "pipeline {} is not accepting lineage",
                pipeline.id
            )));
        }
        if request.sources.is_empty() || request.targets.is_empty() {
            return Err(crate::Error::Validation(
                "lineage submission requires at least one source and one target".to_string(),
            ));
        }

        let source_ids = self.resolve_addresses(&request.sources).await?;
        let target_ids = self.resolve_addresses(&request.targets).await?;

        let edges = cartesian_edges(&source_ids, &target_ids);

        let old_ids = self
            .store
            .pipeline_edge_address_ids(request.pipeline_id)
            .await?;
        self.store
            .replace_pipeline_edges(request.pipeline_id, &edges)
            .await?;

        let mut seed: BTreeSet<i64> = old_ids.into_iter().collect();
        seed.extend(&source_ids);
        seed.extend(&target_ids);
        let seed: Vec<i64> = seed.into_iter().collect();

        let response = LineageSubmitResponse {
            edge_count: edges.len(),
            seed_count: seed.len(),
        };
        self.queue
            .enqueue(Job::new(JobPayload::ClosureRebuild {
                pipeline_id: request.pipeline_id,
                seed,
            }))
            .await?;

        info!(
            pipeline_id = request.pipeline_id,
            edges = response.edge_count,
            seed = response.seed_count,
            "Lineage submitted, closure rebuild enqueued"
        );
        Ok(response)
    }

    /// `timeliness.check`: enqueue a timeliness evaluation pass.
    pub async fn timeliness_check(&self, lookback_minutes: i64) -> Result<()> {
        if lookback_minutes <= 0 {
            return Err(crate::Error::Validation(
                "lookback_minutes must be positive".to_string(),
            ));
        }
        self.queue
            .enqueue(Job::new(JobPayload::TimelinessCheck { lookback_minutes }))
            .await?;
        Ok(())
    }

    /// `freshness.check`: enqueue a freshness evaluation pass.
    pub async fn freshness_check(&self) -> Result<()> {
        self.queue
            .enqueue(Job::new(JobPayload::FreshnessCheck))
            .await?;
        Ok(())
    }

    /// `anomaly.unflag`: synchronously clear anomaly flags.
    #[instrument(skip(self, request), fields(execution_id = request.execution_id))]
    pub async fn anomaly_unflag(&self, request: UnflagRequest) -> Result<()> {
        if request.metrics.is_empty() {
            return Err(crate::Error::Validation(
                "at least one metric is required".to_string(),
            ));
        }
        self.detector
            .unflag(request.pipeline_id, request.execution_id, &request.metrics)
            .await?;
        Ok(())
    }

    async fn resolve_addresses(&self, specs: &[AddressSpec]) -> Result<Vec<i64>> {
        let mut ids = Vec::with_capacity(specs.len());
        for spec in specs {
            let (address_type, _) = self
                .store
                .get_or_create_address_type(&spec.address_type_name, &spec.address_type_group)
                .await?;
            let (address, _) = self
                .store
                .get_or_create_address(&spec.name, &address_type)
                .await?;
            ids.push(address.id);
        }
        Ok(ids)
    }
}

/// Cartesian product of sources and targets, deduplicated, self-edges
/// dropped.
fn cartesian_edges(source_ids: &[i64], target_ids: &[i64]) -> Vec<(i64, i64)> {
    let mut edges = Vec::new();
    let mut seen = BTreeSet::new();
    for &source in source_ids {
        for &target in target_ids {
            if source != target && seen.insert((source, target)) {
                edges.push((source, target));
            }
        }
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cartesian_covers_every_pair() {
        let edges = cartesian_edges(&[1, 2], &[3, 4]);
        assert_eq!(edges, vec![(1, 3), (1, 4), (2, 3), (2, 4)]);
    }

    #[test]
    fn cartesian_drops_self_edges_and_duplicates() {
        let edges = cartesian_edges(&[1, 2, 2], &[2, 3]);
        assert_eq!(edges, vec![(1, 2), (1, 3), (2, 3)]);
    }

    #[test]
    fn cartesian_of_empty_side_is_empty() {
        assert!(cartesian_edges(&[], &[1]).is_empty());
        assert!(cartesian_edges(&[1], &[]).is_empty());
    }
}
