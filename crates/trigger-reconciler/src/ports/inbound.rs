//! Inbound Ports (Driving Ports / API)

use crate::domain::entities::{ReconcileReport, TriggerContainer, TriggerInstance};
use crate::domain::errors::ReconcileError;
use crate::domain::value_objects::{InstanceId, JobId, TriggerSpec};
use async_trait::async_trait;

/// Primary trigger reconciliation API
#[async_trait]
pub trait TriggerReconciliationApi: Send + Sync {
    /// Move the job's running triggers to match `desired`.
    ///
    /// This is the main entry point. It:
    /// 1. Loads the job's current container
    /// 2. Diffs it against `desired` by per-kind value equality
    /// 3. Stops what is no longer wanted, starts what is new
    /// 4. Commits the new container, or removes it when empty
    async fn reconcile(
        &self,
        job: &JobId,
        desired: Vec<TriggerSpec>,
    ) -> Result<ReconcileReport, ReconcileError>;

    /// Add an external instance to the job's container.
    async fn add_external(&self, job: &JobId, instance: TriggerInstance)
        -> Result<(), ReconcileError>;

    /// Remove an external instance. Returns whether it was present.
    async fn remove_external(&self, job: &JobId, id: InstanceId) -> Result<bool, ReconcileError>;

    /// The job's committed container, if any.
    fn container(&self, job: &JobId) -> Result<Option<TriggerContainer>, ReconcileError>;

    /// Jobs that currently have a container.
    fn jobs(&self) -> Result<Vec<JobId>, ReconcileError>;

    /// Stop every managed trigger of every job. External triggers stay.
    async fn stop_all(&self) -> Result<Vec<ReconcileReport>, ReconcileError>;
}
