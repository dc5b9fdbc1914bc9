//! Schedule parsing and next-occurrence search for the timer kinds.

use chrono::{TimeZone, Utc};
use criterion::{black_box, BenchmarkId, Criterion};
use trigger_reconciler::Schedule;

const SPECS: [&str; 4] = ["H/15 * * * *", "H 2 * * 1-5", "0 0 29 2 *", "@weekly\nH H(0-6) * * *"];

pub fn register_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("schedule");
    let from = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).single().expect("valid instant");

    for spec in SPECS {
        group.bench_with_input(BenchmarkId::new("parse", spec.escape_debug()), spec, |b, spec| {
            b.iter(|| black_box(Schedule::parse(spec, "bench-job").expect("valid spec")))
        });

        let schedule = Schedule::parse(spec, "bench-job").expect("valid spec");
        group.bench_with_input(
            BenchmarkId::new("next_after", spec.escape_debug()),
            &schedule,
            |b, schedule| b.iter(|| black_box(schedule.next_after(from))),
        );
    }

    group.finish();
}
