//! In-memory closure propagation
//!
//! Rebuilds the transitive closure of one connected component, carrying a
//! witness path per reachable pair. Expansion is breadth-first by depth, so
//! the first row produced for a `(source, target)` pair is a shortest one
//! and later candidates for the same pair are discarded. A candidate whose
//! extension vertex already appears in its path is dropped, which keeps
//! propagation finite on cyclic input.

use crate::component::ComponentGraph;
use pulse_storage::NewClosureRow;
use std::collections::HashSet;

/// Compute the full closure row set for a component.
///
/// Emits a depth-0 self-row for every vertex, a depth-1 row per edge, and a
/// row with a witness path for every transitively reachable pair.
pub fn propagate_closure(component: &ComponentGraph) -> Vec<NewClosureRow> {
    let mut rows: Vec<NewClosureRow> = Vec::new();
    let mut seen: HashSet<(i64, i64)> = HashSet::new();

    for v in component.vertices() {
        seen.insert((v, v));
        rows.push(NewClosureRow {
            source_address_id: v,
            target_address_id: v,
            depth: 0,
            lineage_path: vec![v],
        });
    }

    // frontier of rows at the current depth, extended one edge per round
    let mut frontier: Vec<(i64, i64, Vec<i64>)> = Vec::new();
    for (s, t) in component.edges() {
        if seen.insert((s, t)) {
            rows.push(NewClosureRow {
                source_address_id: s,
                target_address_id: t,
                depth: 1,
                lineage_path: vec![s, t],
            });
            frontier.push((s, t, vec![s, t]));
        }
    }

    while !frontier.is_empty() {
        let mut next = Vec::new();
        for (source, tail, path) in &frontier {
            for succ in component.successors(*tail) {
                if path.contains(&succ) {
                    // revisiting a vertex means a cycle; drop the candidate
                    continue;
                }
                if !seen.insert((*source, succ)) {
                    continue;
                }
                let mut extended = path.clone();
                extended.push(succ);
                rows.push(NewClosureRow {
                    source_address_id: *source,
                    target_address_id: succ,
                    depth: (extended.len() - 1) as i32,
                    lineage_path: extended.clone(),
                });
                next.push((*source, succ, extended));
            }
        }
        frontier = next;
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(edges: &[(i64, i64)], extra_vertices: &[i64]) -> ComponentGraph {
        let mut g = ComponentGraph::new();
        for v in extra_vertices {
            g.add_vertex(*v);
        }
        for (s, t) in edges {
            g.add_edge(*s, *t);
        }
        g
    }

    fn find<'a>(rows: &'a [NewClosureRow], source: i64, target: i64) -> Option<&'a NewClosureRow> {
        rows.iter()
            .find(|r| r.source_address_id == source && r.target_address_id == target)
    }

    #[test]
    fn chain_produces_all_pairs() {
        let rows = propagate_closure(&component(&[(1, 2), (2, 3), (3, 4)], &[]));
        // 4 self-rows + 3 edges + (1,3),(1,4),(2,4)
        assert_eq!(rows.len(), 10);
        let r = find(&rows, 1, 4).unwrap();
        assert_eq!(r.depth, 3);
        assert_eq!(r.lineage_path, vec![1, 2, 3, 4]);
    }

    #[test]
    fn diamond_keeps_one_witness_at_min_depth() {
        let rows = propagate_closure(&component(&[(1, 2), (1, 3), (2, 4), (3, 4)], &[]));
        // 4 self-rows + 4 edges + one (1,4) row
        assert_eq!(rows.len(), 9);
        let r = find(&rows, 1, 4).unwrap();
        assert_eq!(r.depth, 2);
        assert!(r.lineage_path == vec![1, 2, 4] || r.lineage_path == vec![1, 3, 4]);
    }

    #[test]
    fn self_rows_cover_isolated_vertices() {
        let rows = propagate_closure(&component(&[(1, 2)], &[7]));
        let r = find(&rows, 7, 7).unwrap();
        assert_eq!(r.depth, 0);
        assert_eq!(r.lineage_path, vec![7]);
        assert!(find(&rows, 7, 1).is_none());
    }

    #[test]
    fn depth_is_minimum_over_alternative_paths() {
        // direct edge 1->4 plus a longer route through 2 and 3
        let rows = propagate_closure(&component(&[(1, 4), (1, 2), (2, 3), (3, 4)], &[]));
        let r = find(&rows, 1, 4).unwrap();
        assert_eq!(r.depth, 1);
        assert_eq!(r.lineage_path, vec![1, 4]);
    }

    #[test]
    fn cycle_terminates_without_self_paths_beyond_depth_zero() {
        let rows = propagate_closure(&component(&[(1, 2), (2, 3), (3, 1)], &[]));
        // every ordered pair realized once, plus three self-rows
        assert_eq!(rows.len(), 9);
        let r = find(&rows, 1, 1).unwrap();
        assert_eq!(r.depth, 0);
        let r = find(&rows, 1, 3).unwrap();
        assert_eq!(r.depth, 2);
        assert_eq!(r.lineage_path, vec![1, 2, 3]);
    }

    #[test]
    fn soundness_invariants_hold() {
        let g = component(&[(1, 2), (1, 3), (2, 4), (3, 4), (4, 5)], &[]);
        let edges: HashSet<(i64, i64)> = g.edges().into_iter().collect();
        let rows = propagate_closure(&g);
        let mut pairs = HashSet::new();
        for row in &rows {
            assert_eq!(row.lineage_path[0], row.source_address_id);
            assert_eq!(*row.lineage_path.last().unwrap(), row.target_address_id);
            assert_eq!(row.lineage_path.len() as i32, row.depth + 1);
            for pair in row.lineage_path.windows(2) {
                assert!(edges.contains(&(pair[0], pair[1])));
            }
            assert!(
                pairs.insert((row.source_address_id, row.target_address_id)),
                "duplicate pair"
            );
        }
    }

    #[test]
    fn idempotent_for_unchanged_edges() {
        let g = component(&[(1, 2), (2, 3), (1, 3)], &[]);
        let mut a = propagate_closure(&g);
        let mut b = propagate_closure(&g);
        let key = |r: &NewClosureRow| (r.source_address_id, r.target_address_id);
        a.sort_by_key(key);
        b.sort_by_key(key);
        assert_eq!(a, b);
    }
}
