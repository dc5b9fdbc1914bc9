//! Outbound Ports (Driven Ports / SPI)

use crate::domain::entities::TriggerContainer;
use crate::domain::errors::{StoreError, TriggerError};
use crate::domain::value_objects::JobId;
use async_trait::async_trait;

/// The start/stop contract every trigger implementation fulfils.
///
/// Config equality is the third part of the contract; it lives on the kind's
/// descriptor because it compares payloads, not live triggers.
#[async_trait]
pub trait Trigger: Send + Sync {
    /// Begin producing fires. May spawn background work; returns once that
    /// work has been set up, not after the first fire.
    async fn activate(&self) -> Result<(), TriggerError>;

    /// Release everything `activate` set up.
    async fn deactivate(&self) -> Result<(), TriggerError>;
}

/// A job's container as last committed, with its version.
///
/// `version` keeps increasing across removals, so a job that lost its
/// container and regained it never reuses an old version.
#[derive(Clone, Debug, Default)]
pub struct ContainerSnapshot {
    pub container: Option<TriggerContainer>,
    pub version: u64,
}

/// Persistence of trigger containers against their jobs.
///
/// Synchronous so that a pass can commit what it has done from `Drop`.
pub trait ContainerStore: Send + Sync {
    /// Load the job's container; absent and unknown jobs give `None`.
    fn load(&self, job: &JobId) -> Result<ContainerSnapshot, StoreError>;

    /// Replace the container if the stored version equals `expected_version`.
    /// Returns the new version. An empty container is `StoreError::EmptyContainer`.
    fn store(&self, container: TriggerContainer, expected_version: u64) -> Result<u64, StoreError>;

    /// Delete the container if the stored version equals `expected_version`.
    /// Returns the new version.
    fn remove(&self, job: &JobId, expected_version: u64) -> Result<u64, StoreError>;

    /// Jobs that currently have a container.
    fn jobs(&self) -> Result<Vec<JobId>, StoreError>;
}

/// Source of the latest revision of a job's repository, used by `scm-poll`.
#[async_trait]
pub trait ScmProbe: Send + Sync {
    /// Latest revision, or `None` when the source has no revisions yet.
    async fn latest_revision(&self, job: &JobId) -> Result<Option<String>, TriggerError>;
}
