//! Connected-component graph
//!
//! An in-memory view of the address subgraph touched by a rebuild: the
//! vertices discovered during traversal plus every edge incident to them,
//! across all pipelines.

use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

/// Directed graph of address ids for one connected component.
pub struct ComponentGraph {
    graph: DiGraph<i64, ()>,
    node_for: HashMap<i64, NodeIndex>,
}

impl ComponentGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_for: HashMap::new(),
        }
    }

    /// Add a vertex if absent, returning its index
    pub fn add_vertex(&mut self, address_id: i64) -> NodeIndex {
        match self.node_for.get(&address_id) {
            Some(idx) => *idx,
            None => {
                let idx = self.graph.add_node(address_id);
                self.node_for.insert(address_id, idx);
                idx
            }
        }
    }

    /// Add an edge, creating endpoints as needed. Parallel edges collapse.
    pub fn add_edge(&mut self, source: i64, target: i64) {
        let s = self.add_vertex(source);
        let t = self.add_vertex(target);
        if self.graph.find_edge(s, t).is_none() {
            self.graph.add_edge(s, t, ());
        }
    }

    pub fn contains(&self, address_id: i64) -> bool {
        self.node_for.contains_key(&address_id)
    }

    /// Direct successors of a vertex
    pub fn successors(&self, address_id: i64) -> Vec<i64> {
        match self.node_for.get(&address_id) {
            Some(idx) => self
                .graph
                .neighbors_directed(*idx, petgraph::Direction::Outgoing)
                .map(|n| self.graph[n])
                .collect(),
            None => Vec::new(),
        }
    }

    /// All vertices, in insertion order
    pub fn vertices(&self) -> Vec<i64> {
        self.graph.node_indices().map(|i| self.graph[i]).collect()
    }

    /// All edges as `(source, target)` pairs
    pub fn edges(&self) -> Vec<(i64, i64)> {
        self.graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(s, t)| (self.graph[s], self.graph[t]))
            .collect()
    }

    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

impl Default for ComponentGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupes_vertices_and_edges() {
        let mut g = ComponentGraph::new();
        g.add_edge(1, 2);
        g.add_edge(1, 2);
        g.add_vertex(1);
        assert_eq!(g.vertex_count(), 2);
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn successors_follow_direction() {
        let mut g = ComponentGraph::new();
        g.add_edge(1, 2);
        g.add_edge(1, 3);
        g.add_edge(2, 3);
        let mut succ = g.successors(1);
        succ.sort_unstable();
        assert_eq!(succ, vec![2, 3]);
        assert!(g.successors(3).is_empty());
        assert!(g.successors(99).is_empty());
    }
}
