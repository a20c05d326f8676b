//! Connected-component traversal
//!
//! Expands a seed set of address ids to the full connected component over
//! the current union of edges across all pipelines, alternating forward and
//! backward frontier queries until a round discovers no new vertex.

use crate::component::ComponentGraph;
use async_trait::async_trait;
use pulse_storage::Result;
use std::collections::HashSet;
use tracing::debug;

/// Source of lineage edges during traversal.
///
/// The production implementation reads the edge table inside the rebuild
/// transaction; tests use an in-memory edge set.
#[async_trait]
pub trait EdgeSource {
    /// Edges `(s, t)` with `s` in `ids`
    async fn edges_from(&mut self, ids: &[i64]) -> Result<Vec<(i64, i64)>>;

    /// Edges `(s, t)` with `t` in `ids`
    async fn edges_into(&mut self, ids: &[i64]) -> Result<Vec<(i64, i64)>>;
}

/// Expand the seed set to its connected component.
///
/// Every vertex passes through the frontier exactly once, and both edge
/// directions are queried for it, so all edges incident to the component are
/// collected.
pub async fn expand_component<E: EdgeSource>(
    source: &mut E,
    seed: &[i64],
) -> Result<ComponentGraph> {
    let mut component = ComponentGraph::new();
    let mut visited: HashSet<i64> = HashSet::new();
    let mut frontier: Vec<i64> = Vec::new();

    for id in seed {
        if visited.insert(*id) {
            component.add_vertex(*id);
            frontier.push(*id);
        }
    }

    let mut rounds = 0usize;
    while !frontier.is_empty() {
        rounds += 1;
        let forward = source.edges_from(&frontier).await?;
        let backward = source.edges_into(&frontier).await?;

        let mut next = Vec::new();
        for (s, t) in forward.into_iter().chain(backward) {
            component.add_edge(s, t);
            for v in [s, t] {
                if visited.insert(v) {
                    next.push(v);
                }
            }
        }
        frontier = next;
    }

    debug!(
        rounds,
        vertices = component.vertex_count(),
        edges = component.edge_count(),
        "Expanded lineage component"
    );
    Ok(component)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// In-memory edge set for traversal tests
    pub struct MemoryEdges(pub Vec<(i64, i64)>);

    #[async_trait]
    impl EdgeSource for MemoryEdges {
        async fn edges_from(&mut self, ids: &[i64]) -> Result<Vec<(i64, i64)>> {
            Ok(self
                .0
                .iter()
                .copied()
                .filter(|(s, _)| ids.contains(s))
                .collect())
        }

        async fn edges_into(&mut self, ids: &[i64]) -> Result<Vec<(i64, i64)>> {
            Ok(self
                .0
                .iter()
                .copied()
                .filter(|(_, t)| ids.contains(t))
                .collect())
        }
    }

    #[tokio::test]
    async fn reaches_upstream_and_downstream() {
        // 1 -> 2 -> 3, 4 -> 2, seeded only with 3
        let mut edges = MemoryEdges(vec![(1, 2), (2, 3), (4, 2)]);
        let component = expand_component(&mut edges, &[3]).await.unwrap();
        let mut vertices = component.vertices();
        vertices.sort_unstable();
        assert_eq!(vertices, vec![1, 2, 3, 4]);
        assert_eq!(component.edge_count(), 3);
    }

    #[tokio::test]
    async fn ignores_disconnected_subgraphs() {
        let mut edges = MemoryEdges(vec![(1, 2), (10, 11)]);
        let component = expand_component(&mut edges, &[1]).await.unwrap();
        let mut vertices = component.vertices();
        vertices.sort_unstable();
        assert_eq!(vertices, vec![1, 2]);
    }

    #[tokio::test]
    async fn seed_only_component_keeps_isolated_vertices() {
        let mut edges = MemoryEdges(vec![]);
        let component = expand_component(&mut edges, &[5, 6]).await.unwrap();
        let mut vertices = component.vertices();
        vertices.sort_unstable();
        assert_eq!(vertices, vec![5, 6]);
        assert_eq!(component.edge_count(), 0);
    }

    #[tokio::test]
    async fn crosses_pipeline_boundaries_through_shared_addresses() {
        // two edge sets sharing address 3: {1->3} and {3->7, 7->9}
        let mut edges = MemoryEdges(vec![(1, 3), (3, 7), (7, 9)]);
        let component = expand_component(&mut edges, &[1]).await.unwrap();
        let mut vertices = component.vertices();
        vertices.sort_unstable();
        assert_eq!(vertices, vec![1, 3, 7, 9]);
    }
}
