//! Error types for trigger reconciliation

use super::value_objects::{InstanceId, JobId, LifecycleState, TriggerKind};
use thiserror::Error;

/// All errors that can occur during a reconciliation pass
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// Registry lookup miss. Fatal to the pass; nothing is committed.
    #[error("Unknown trigger kind: {kind}")]
    UnknownTriggerKind { kind: TriggerKind },

    /// A single trigger failed to construct or activate.
    #[error("Activation of {kind} trigger for job {job} failed: {reason}")]
    ActivationFailure {
        job: JobId,
        kind: TriggerKind,
        reason: String,
    },

    /// A single trigger failed to deactivate; its background work may leak.
    #[error("Deactivation of {kind} trigger {instance} for job {job} failed: {reason}")]
    DeactivationFailure {
        job: JobId,
        kind: TriggerKind,
        instance: InstanceId,
        reason: String,
    },

    /// Another writer committed the container first. Retry the whole pass.
    #[error("Concurrent reconciliation of job {job}: expected version {expected}, found {actual}")]
    ConcurrentReconciliationConflict {
        job: JobId,
        expected: u64,
        actual: u64,
    },

    /// Illegal lifecycle transition.
    #[error("Invalid transition for trigger {instance}: {from} -> {to}")]
    InvalidTransition {
        instance: InstanceId,
        from: LifecycleState,
        to: LifecycleState,
    },

    /// Lifecycle operation attempted on an external trigger.
    #[error("Trigger {instance} is external and not owned by the reconciler")]
    ExternalTrigger { instance: InstanceId },

    /// A managed trigger was offered where an external one is required.
    #[error("Trigger {instance} is managed; only external triggers can be injected")]
    NotExternal { instance: InstanceId },

    /// Container persistence failed.
    #[error("Container store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ReconcileError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionMismatch {
                job,
                expected,
                actual,
            } => ReconcileError::ConcurrentReconciliationConflict {
                job,
                expected,
                actual,
            },
            other => ReconcileError::Store(other),
        }
    }
}

/// Errors returned by trigger implementations and constructors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TriggerError {
    #[error("Invalid trigger configuration: {0}")]
    InvalidConfig(String),

    #[error("Activation failed: {0}")]
    Activation(String),

    #[error("Deactivation failed: {0}")]
    Deactivation(String),

    #[error("Source probe failed: {0}")]
    Probe(String),
}

/// Container store errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Optimistic version check failed.
    #[error("Version mismatch for job {job}: expected {expected}, found {actual}")]
    VersionMismatch {
        job: JobId,
        expected: u64,
        actual: u64,
    },

    /// An empty trigger set is stored as no container; use `remove`.
    #[error("Refusing to store an empty container for job {job}")]
    EmptyContainer { job: JobId },

    #[error("Store backend failure: {0}")]
    Backend(String),
}

/// Descriptor registry errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Trigger kind already registered: {0}")]
    DuplicateKind(TriggerKind),

    #[error("Global trigger registry already installed")]
    AlreadyInstalled,
}
