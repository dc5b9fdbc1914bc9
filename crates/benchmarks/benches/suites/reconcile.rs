//! Full reconciliation passes: load, diff, stop, start, commit.

use criterion::{black_box, BenchmarkId, Criterion};
use std::sync::Arc;
use trigger_benchmarks::{registry, specs};
use trigger_reconciler::{
    InMemoryContainerStore, JobId, TriggerContainerManager, TriggerReconciliationApi,
};

fn manager() -> TriggerContainerManager {
    TriggerContainerManager::new(Arc::new(registry()), Arc::new(InMemoryContainerStore::new()))
}

pub fn register_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile");
    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");

    for size in [4, 32] {
        let manager = manager();
        let job = JobId::from("bench");
        let desired = specs(size);
        rt.block_on(manager.reconcile(&job, desired.clone())).expect("initial pass");

        group.bench_with_input(BenchmarkId::new("noop_pass", size), &size, |b, _| {
            b.iter(|| {
                let report = rt.block_on(manager.reconcile(&job, desired.clone()));
                black_box(report.expect("pass"))
            })
        });

        // Alternate between two lists so every pass replaces half the triggers.
        let mut other = desired.clone();
        other.truncate(size / 2);
        other.extend(specs(size * 2).into_iter().skip(size).take(size / 2));
        let mut flip = false;
        group.bench_with_input(BenchmarkId::new("half_replaced", size), &size, |b, _| {
            b.iter(|| {
                flip = !flip;
                let list = if flip { other.clone() } else { desired.clone() };
                black_box(rt.block_on(manager.reconcile(&job, list)).expect("pass"))
            })
        });
    }

    group.bench_function("many_jobs_once", |b| {
        let desired = specs(4);
        b.iter(|| {
            let manager = manager();
            rt.block_on(async {
                for i in 0..100 {
                    let job = JobId::new(format!("job-{i}"));
                    black_box(manager.reconcile(&job, desired.clone()).await.expect("pass"));
                }
            })
        })
    });

    group.finish();
}
