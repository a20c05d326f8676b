//! Execution ancestry closure
//!
//! Each ended execution contributes a depth-0 self-row plus one row per
//! ancestor of its parent, depth incremented, so "all descendants of E" and
//! "all ancestors of E" are single indexed scans at any DAG depth.

use crate::Result;
use pulse_storage::MetricStore;
use std::sync::Arc;
use tracing::instrument;

/// Rows to insert for a new execution given its parent's ancestor rows.
///
/// `parent_ancestors` are `(ancestor_id, depth)` pairs including the
/// parent's own self-row; pass an empty slice for a parentless execution.
pub fn ancestry_rows(parent_ancestors: &[(i64, i32)], execution_id: i64) -> Vec<(i64, i64, i32)> {
    let mut rows = vec![(execution_id, execution_id, 0)];
    rows.extend(
        parent_ancestors
            .iter()
            .map(|(ancestor, depth)| (*ancestor, execution_id, depth + 1)),
    );
    rows
}

/// Maintains the execution-ancestry closure.
#[derive(Clone)]
pub struct AncestryEngine {
    store: Arc<MetricStore>,
}

impl AncestryEngine {
    pub fn new(store: Arc<MetricStore>) -> Self {
        Self { store }
    }

    /// Record the closure rows for an ended execution.
    ///
    /// Safe to retry: inserts are `ON CONFLICT DO NOTHING` on the
    /// `(ancestor, descendant)` pair.
    #[instrument(skip(self))]
    pub async fn record(&self, execution_id: i64, parent_execution_id: Option<i64>) -> Result<()> {
        self.store
            .insert_execution_ancestry(execution_id, parent_execution_id)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_execution_gets_only_self_row() {
        assert_eq!(ancestry_rows(&[], 42), vec![(42, 42, 0)]);
    }

    #[test]
    fn child_inherits_every_parent_ancestor_with_incremented_depth() {
        // parent 10 has ancestors: itself (depth 0), 5 at depth 1, 1 at depth 2
        let parent = vec![(10, 0), (5, 1), (1, 2)];
        let rows = ancestry_rows(&parent, 20);
        assert_eq!(
            rows,
            vec![(20, 20, 0), (10, 20, 1), (5, 20, 2), (1, 20, 3)]
        );
    }
}
