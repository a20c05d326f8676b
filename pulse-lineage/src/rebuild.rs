//! Closure rebuild orchestration
//!
//! Runs the full rebuild for one pipeline: expand the affected component,
//! delete every closure row touching it, propagate the closure in memory and
//! bulk-insert the result. The whole rebuild executes inside the store's
//! advisory-locked savepoint scope, so rebuilds for the same pipeline are
//! serialized and a failure leaves the previously committed closure intact.

use crate::closure::propagate_closure;
use crate::traversal::{expand_component, EdgeSource};
use crate::Result;
use async_trait::async_trait;
use pulse_storage::MetricStore;
use sqlx::{Postgres, Transaction};
use std::sync::Arc;
use tracing::{info, instrument};

/// Edge source reading the lineage table inside the rebuild transaction
struct TxEdges<'a, 'b> {
    tx: &'a mut Transaction<'b, Postgres>,
}

#[async_trait]
impl EdgeSource for TxEdges<'_, '_> {
    async fn edges_from(&mut self, ids: &[i64]) -> pulse_storage::Result<Vec<(i64, i64)>> {
        MetricStore::edges_from(self.tx, ids).await
    }

    async fn edges_into(&mut self, ids: &[i64]) -> pulse_storage::Result<Vec<(i64, i64)>> {
        MetricStore::edges_into(self.tx, ids).await
    }
}

/// Outcome of one rebuild, for logging and diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildSummary {
    pub vertices: usize,
    pub edges: usize,
    pub rows_deleted: u64,
    pub rows_inserted: usize,
}

/// Rebuilds the address-lineage closure after an edge replacement.
#[derive(Clone)]
pub struct ClosureRebuilder {
    store: Arc<MetricStore>,
}

impl ClosureRebuilder {
    pub fn new(store: Arc<MetricStore>) -> Self {
        Self { store }
    }

    /// Rebuild the closure for the component reachable from `seed`.
    ///
    /// `seed` must cover the union of the pipeline's pre-existing and newly
    /// submitted address sets; vertices dropped by the replacement then get
    /// their stale closure rows removed along with the rest of the
    /// component.
    #[instrument(skip(self, seed), fields(seed_count = seed.len()))]
    pub async fn rebuild_for_pipeline(
        &self,
        pipeline_id: i64,
        seed: Vec<i64>,
    ) -> Result<RebuildSummary> {
        let summary = self
            .store
            .closure_rebuild_scope(pipeline_id, move |tx| {
                Box::pin(async move {
                    let component = {
                        let mut edges = TxEdges { tx: &mut *tx };
                        expand_component(&mut edges, &seed).await?
                    };

                    let vertices = component.vertices();
                    let rows_deleted = MetricStore::delete_closure_touching(tx, &vertices).await?;

                    let rows = propagate_closure(&component);
                    MetricStore::insert_closure_rows(tx, &rows).await?;

                    Ok(RebuildSummary {
                        vertices: vertices.len(),
                        edges: component.edge_count(),
                        rows_deleted,
                        rows_inserted: rows.len(),
                    })
                })
            })
            .await?;

        info!(
            pipeline_id,
            vertices = summary.vertices,
            edges = summary.edges,
            rows_deleted = summary.rows_deleted,
            rows_inserted = summary.rows_inserted,
            "Lineage closure rebuilt"
        );
        Ok(summary)
    }
}
