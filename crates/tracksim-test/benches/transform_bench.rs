//! Benchmarks for the transform pipeline

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;

use tracksim_core::{compose, invert, Aspect};
use tracksim_test::{coil, random_rigid};
use tracksim_visual::tracker_pose_from_world;

fn bench_compose_display_chain(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let chain = [
        random_rigid(&mut rng),
        random_rigid(&mut rng),
        random_rigid(&mut rng),
    ];

    c.bench_function("compose_display_chain", |b| {
        b.iter(|| compose(black_box(&chain)))
    });
}

fn bench_invert_rigid(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(11);
    let m = random_rigid(&mut rng);

    c.bench_function("invert_rigid", |b| b.iter(|| invert(black_box(&m))));
}

fn bench_tracker_pose_from_world(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(13);
    let entity = coil("coil");
    let world = random_rigid(&mut rng);

    c.bench_function("tracker_pose_from_world", |b| {
        b.iter(|| {
            let pose = tracker_pose_from_world(&entity, Aspect::Tool, black_box(&world)).unwrap();
            black_box(pose)
        })
    });
}

criterion_group!(
    benches,
    bench_compose_display_chain,
    bench_invert_rigid,
    bench_tracker_pose_from_world
);
criterion_main!(benches);
