//! Custom assertions shared by the end-to-end suite

use pulse_storage::models::NewClosureRow;
use std::collections::HashSet;

/// Assert the structural invariants that must hold for every closure row:
/// the path starts at the source, ends at the target, has `depth + 1`
/// vertices, repeats no vertex, and every consecutive pair is a known edge.
pub fn assert_closure_rows_sound(rows: &[NewClosureRow], edges: &[(i64, i64)]) {
    let edge_set: HashSet<(i64, i64)> = edges.iter().copied().collect();
    for row in rows {
        assert_eq!(
            row.lineage_path.len(),
            row.depth as usize + 1,
            "path length must be depth + 1: {row:?}"
        );
        assert_eq!(
            row.lineage_path.first().copied(),
            Some(row.source_address_id),
            "path must start at the source: {row:?}"
        );
        assert_eq!(
            row.lineage_path.last().copied(),
            Some(row.target_address_id),
            "path must end at the target: {row:?}"
        );

        let distinct: HashSet<i64> = row.lineage_path.iter().copied().collect();
        assert_eq!(
            distinct.len(),
            row.lineage_path.len(),
            "witness path must be simple: {row:?}"
        );

        for pair in row.lineage_path.windows(2) {
            assert!(
                edge_set.contains(&(pair[0], pair[1])),
                "witness path uses unknown edge {:?}: {row:?}",
                (pair[0], pair[1])
            );
        }
    }
}

/// Assert the closure contains a row for the ordered pair at the expected
/// depth.
pub fn assert_closure_contains(rows: &[NewClosureRow], source: i64, target: i64, depth: i32) {
    assert!(
        rows.iter().any(|r| r.source_address_id == source
            && r.target_address_id == target
            && r.depth == depth),
        "missing closure row ({source}, {target}) at depth {depth}"
    );
}
