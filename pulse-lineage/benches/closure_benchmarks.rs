//! Closure propagation benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pulse_lineage::{propagate_closure, ComponentGraph};

/// Layered DAG: `layers` levels of `width` vertices, fully connected between
/// adjacent layers.
fn layered_dag(layers: i64, width: i64) -> ComponentGraph {
    let mut g = ComponentGraph::new();
    for layer in 0..layers - 1 {
        for a in 0..width {
            for b in 0..width {
                g.add_edge(layer * width + a, (layer + 1) * width + b);
            }
        }
    }
    g
}

fn chain(len: i64) -> ComponentGraph {
    let mut g = ComponentGraph::new();
    for i in 0..len - 1 {
        g.add_edge(i, i + 1);
    }
    g
}

fn bench_propagation(c: &mut Criterion) {
    let mut group = c.benchmark_group("closure_propagation");

    for len in [32, 128, 512] {
        group.bench_with_input(BenchmarkId::new("chain", len), &len, |b, &len| {
            let g = chain(len);
            b.iter(|| black_box(propagate_closure(&g)));
        });
    }

    for (layers, width) in [(4, 4), (6, 6), (8, 8)] {
        let id = format!("{layers}x{width}");
        group.bench_with_input(
            BenchmarkId::new("layered_dag", id),
            &(layers, width),
            |b, &(layers, width)| {
                let g = layered_dag(layers, width);
                b.iter(|| black_box(propagate_closure(&g)));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_propagation);
criterion_main!(benches);
