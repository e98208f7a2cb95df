//! Benchmarks for the PCA aggregation lifecycle.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pca_stats::kernel::{from_bytes, to_bytes, JacobiSolver, MatrixBuilder, MatrixMode};
use pca_stats::{AggregationState, PcaState, PcaStrategy, Reducer, StreamingStats};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

// =============================================================================
// Synthetic documents
// =============================================================================

const FIELDS: [&str; 8] = [
    "cpu", "disk_read", "disk_write", "heap", "latency", "net_in", "net_out", "threads",
];

fn documents(n: usize, seed: u64) -> Vec<Vec<(&'static str, f64)>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let load: f64 = rng.gen_range(0.0..100.0);
            FIELDS
                .iter()
                .enumerate()
                .map(|(i, &name)| (name, load * (i as f64 + 1.0) + rng.gen_range(-10.0..10.0)))
                .collect()
        })
        .collect()
}

fn partition(docs: &[Vec<(&'static str, f64)>], use_covariance: bool) -> PcaState {
    let mut state = AggregationState::new("pca", PcaStrategy::new(use_covariance));
    for doc in docs {
        state.collect(doc.iter().copied());
    }
    state
}

fn benchmark_accumulate(c: &mut Criterion) {
    let docs = documents(1_000, 1);

    c.bench_function("accumulate_1k_docs_8_fields", |b| {
        b.iter(|| {
            let mut stats = StreamingStats::new();
            for doc in &docs {
                stats.accumulate(black_box(doc.iter().copied()));
            }
            stats
        })
    });
}

fn benchmark_merge(c: &mut Criterion) {
    let docs = documents(2_000, 2);
    let left = partition(&docs[..1_000], false);
    let right = partition(&docs[1_000..], false);

    c.bench_function("merge_two_partitions", |b| {
        b.iter(|| black_box(left.clone()).merge(black_box(right.clone())))
    });
}

fn benchmark_reduce(c: &mut Criterion) {
    let docs = documents(3_200, 3);
    let partitions: Vec<PcaState> = docs.chunks(100).map(|c| partition(c, false)).collect();

    c.bench_function("reduce_32_partitions", |b| {
        b.iter(|| Reducer::new().reduce(black_box(partitions.clone())))
    });
}

fn benchmark_decompose(c: &mut Criterion) {
    let docs = documents(500, 4);
    let state = partition(&docs, true);
    let built = MatrixBuilder::build(state.stats(), MatrixMode::Covariance);
    let solver = JacobiSolver::new();

    c.bench_function("jacobi_8x8", |b| {
        b.iter(|| solver.decompose(black_box(&built.matrix)))
    });
}

fn benchmark_finalize_render(c: &mut Criterion) {
    let docs = documents(500, 5);
    let state = partition(&docs, false);

    c.bench_function("finalize_and_render", |b| {
        b.iter(|| {
            black_box(state.clone())
                .finalize()
                .and_then(|s| s.render())
        })
    });
}

fn benchmark_codec(c: &mut Criterion) {
    let docs = documents(500, 6);
    let state = partition(&docs, false);
    let bytes = to_bytes(&state);

    c.bench_function("state_to_bytes", |b| b.iter(|| to_bytes(black_box(&state))));
    c.bench_function("state_from_bytes", |b| {
        b.iter(|| from_bytes::<PcaState>(black_box(&bytes)))
    });
}

criterion_group!(
    benches,
    benchmark_accumulate,
    benchmark_merge,
    benchmark_reduce,
    benchmark_decompose,
    benchmark_finalize_render,
    benchmark_codec,
);

criterion_main!(benches);
