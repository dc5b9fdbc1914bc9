//! Algorithms for trigger reconciliation
//!
//! - Diff: partition current instances against desired specs by value equality

pub mod diff;

pub use diff::diff;
