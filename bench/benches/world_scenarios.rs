//! World core scenario benchmarks using Criterion.
//!
//! These measure the structural hot paths:
//! - entity churn (create/destroy with id reuse)
//! - archetype migration (add/remove component chunk moves)
//! - recorded operation playback

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use worlds_bench::{ChurnScenario, MigrationScenario, PlaybackScenario, Scenario};

fn bench_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("world/churn");

    for population in [1_000, 10_000, 100_000] {
        group.throughput(Throughput::Elements(population as u64 / 10));
        group.bench_with_input(
            BenchmarkId::new("frame", population),
            &population,
            |b, &n| {
                let mut scenario = ChurnScenario::new(n);
                scenario.setup();
                b.iter(|| scenario.update());
            },
        );
    }

    group.finish();
}

fn bench_migration(c: &mut Criterion) {
    let mut group = c.benchmark_group("world/migration");

    for population in [1_000, 10_000] {
        group.throughput(Throughput::Elements(population as u64));
        group.bench_with_input(
            BenchmarkId::new("toggle_component", population),
            &population,
            |b, &n| {
                let mut scenario = MigrationScenario::new(n);
                scenario.setup();
                b.iter(|| scenario.update());
            },
        );
    }

    group.finish();
}

fn bench_playback(c: &mut Criterion) {
    let mut group = c.benchmark_group("world/playback");

    for batch in [100, 1_000] {
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::new("perform", batch), &batch, |b, &n| {
            let mut scenario = PlaybackScenario::new(n);
            scenario.setup();
            b.iter(|| scenario.update());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_churn, bench_migration, bench_playback);
criterion_main!(benches);
