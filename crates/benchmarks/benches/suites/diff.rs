//! Diff engine: cost of classifying current instances against a desired list.

use criterion::{black_box, BenchmarkId, Criterion, Throughput};
use trigger_benchmarks::{registry, running, specs};
use trigger_reconciler::{diff, JobId};

pub fn register_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff");
    let registry = registry();
    let job = JobId::from("bench");

    for size in [4, 32, 256] {
        let desired = specs(size);
        let current = running(&job, &desired);
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("unchanged", size), &size, |b, _| {
            b.iter(|| black_box(diff(&registry, &current, &desired).expect("known kinds")))
        });

        let mut rotated = desired.clone();
        rotated.rotate_left(size / 2);
        group.bench_with_input(BenchmarkId::new("rotated", size), &size, |b, _| {
            b.iter(|| black_box(diff(&registry, &current, &rotated).expect("known kinds")))
        });

        // Every payload differs, so every current instance is stopped.
        let replaced = specs(size * 2).split_off(size);
        group.bench_with_input(BenchmarkId::new("replaced", size), &size, |b, _| {
            b.iter(|| black_box(diff(&registry, &current, &replaced).expect("known kinds")))
        });
    }

    group.finish();
}
