//! Benchmark suites, one per component.

pub mod diff;
pub mod reconcile;
pub mod schedule;
