//! # Trigger Reconciler
//!
//! Keeps each job's running triggers in step with the triggers its
//! definition declares. Every reconciliation pass diffs the declared specs
//! against the job's container, stops what is no longer wanted, starts what
//! is new and leaves everything equivalent running untouched.
//!
//! ## Architecture
//!
//! - **Domain**: Job ids, trigger specs, instances, containers, plans and reports
//! - **Registry**: Catalog of trigger kinds (equality + construction per kind)
//! - **Algorithms**: The diff that turns current + desired into a plan
//! - **Ports**: Inbound (`TriggerReconciliationApi`) and Outbound (`Trigger`,
//!   `ContainerStore`, `ScmProbe`)
//! - **Application**: Lifecycle controller and the container manager
//! - **Adapters**: In-memory store and the built-in `timer` / `scm-poll` kinds
//!
//! ## Guarantees
//!
//! - Externally registered triggers are never started, stopped or dropped by a pass.
//! - Passes on one job are serialized; passes on different jobs run concurrently.
//! - A pass whose commit loses the optimistic version check stops what it started.
//! - A cancelled pass still commits the instances it actually started.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod algorithms;
pub mod application;
pub mod config;
pub mod domain;
pub mod metrics;
pub mod ports;
pub mod registry;

pub use adapters::{register_builtin_kinds, InMemoryContainerStore, Schedule, ScheduleError};
pub use algorithms::diff;
pub use application::journal::CommitOutcome;
pub use application::lifecycle::LifecycleController;
pub use application::service::TriggerContainerManager;
pub use config::ReconcilerConfig;
pub use domain::entities::*;
pub use domain::errors::{ReconcileError, RegistryError, StoreError, TriggerError};
pub use domain::value_objects::*;
pub use ports::inbound::TriggerReconciliationApi;
pub use ports::outbound::{ContainerSnapshot, ContainerStore, ScmProbe, Trigger};
pub use registry::{
    global, install_global, ConstructionContext, DescriptorRegistry, RegistryBuilder,
    TriggerDescriptor,
};
