//! Benchmarks for pose caching and snapshots

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;

use tracksim_core::{EntityKey, Timestamp, TimestampedPose};
use tracksim_runtime::{export_snapshot, parse_snapshot, ExportOptions, Snapshot};
use tracksim_state::PoseCache;
use tracksim_test::random_rigid;

fn poses(count: usize) -> Snapshot {
    let mut rng = StdRng::seed_from_u64(42);
    (0..count)
        .map(|i| {
            let pose = TimestampedPose::new(
                Timestamp::from_secs_f64(1_700_000_000.0 + i as f64),
                Some(random_rigid(&mut rng)),
            );
            (EntityKey::new(format!("tool_{}", i)), pose)
        })
        .collect()
}

fn bench_cache_apply_batch(c: &mut Criterion) {
    let batch: Vec<_> = poses(32).into_iter().collect();
    let cache = PoseCache::new();

    c.bench_function("cache_apply_batch_32", |b| {
        b.iter_batched(
            || batch.clone(),
            |batch| cache.apply(black_box(batch)),
            BatchSize::SmallInput,
        )
    });
}

fn bench_export_snapshot(c: &mut Criterion) {
    let snapshot = poses(32);

    c.bench_function("export_snapshot_32", |b| {
        b.iter(|| export_snapshot(black_box(&snapshot), ExportOptions::default()).unwrap())
    });
}

fn bench_parse_snapshot(c: &mut Criterion) {
    let json = export_snapshot(&poses(32), ExportOptions::default()).unwrap();

    c.bench_function("parse_snapshot_32", |b| {
        b.iter(|| parse_snapshot(black_box(&json)).unwrap())
    });
}

criterion_group!(
    benches,
    bench_cache_apply_batch,
    bench_export_snapshot,
    bench_parse_snapshot
);
criterion_main!(benches);
