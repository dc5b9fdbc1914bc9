//! Pass journal
//!
//! Tracks what a reconciliation pass has really done to the job's triggers
//! and turns it into the container to commit. If the pass is dropped before
//! it commits (its future was cancelled), the journal commits the partial
//! state itself, so the store never lists a trigger that was already stopped
//! or forgets one that was already started.

use crate::domain::entities::{PlanSlot, ReconciliationPlan, TriggerContainer, TriggerInstance};
use crate::domain::errors::StoreError;
use crate::domain::value_objects::{InstanceId, JobId, LifecycleState};
use crate::ports::outbound::ContainerStore;
use std::sync::Arc;
use tracing::{error, warn};

/// Result of committing a pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    /// A non-empty container was written.
    Stored {
        version: u64,
        managed: usize,
        external: usize,
    },
    /// The container was deleted.
    Removed { version: u64 },
    /// Nothing changed; the store was left alone.
    Unchanged,
}

pub(crate) struct PassJournal {
    store: Arc<dyn ContainerStore>,
    job: JobId,
    base_version: u64,
    base_ids: Vec<InstanceId>,
    had_container: bool,
    kept: Vec<TriggerInstance>,
    layout: Vec<PlanSlot>,
    to_stop: Vec<TriggerInstance>,
    started: Vec<Option<TriggerInstance>>,
    touched: bool,
    committed: bool,
}

impl PassJournal {
    pub(crate) fn new(
        store: Arc<dyn ContainerStore>,
        job: JobId,
        base_version: u64,
        current: &[TriggerInstance],
        had_container: bool,
        plan: &ReconciliationPlan,
    ) -> Self {
        Self {
            store,
            job,
            base_version,
            base_ids: current.iter().map(TriggerInstance::id).collect(),
            had_container,
            kept: plan.unchanged.clone(),
            layout: plan.layout.clone(),
            to_stop: plan.to_stop.clone(),
            started: vec![None; plan.to_start.len()],
            touched: false,
            committed: false,
        }
    }

    /// A stop of one of the planned instances is about to begin.
    pub(crate) fn record_stop_attempt(&mut self) {
        self.touched = true;
    }

    /// `instance` was constructed for `to_start[slot]` and is about to be activated.
    pub(crate) fn record_prepared(&mut self, slot: usize, instance: TriggerInstance) {
        self.touched = true;
        if let Some(entry) = self.started.get_mut(slot) {
            *entry = Some(instance);
        }
    }

    /// Instances this pass started that are still live.
    pub(crate) fn started_instances(&self) -> Vec<TriggerInstance> {
        self.started
            .iter()
            .flatten()
            .filter(|i| i.state().is_live())
            .cloned()
            .collect()
    }

    /// The container contents reflecting what has actually happened.
    ///
    /// Desired order first: kept instances and live newly started ones.
    /// Then planned stops that never got stopped, then externals.
    pub(crate) fn assemble(&self) -> Vec<TriggerInstance> {
        let mut instances = Vec::with_capacity(self.kept.len() + self.started.len());

        for slot in &self.layout {
            match *slot {
                PlanSlot::Keep(i) => instances.extend(self.kept.get(i).cloned()),
                PlanSlot::Start(j) => {
                    if let Some(Some(inst)) = self.started.get(j) {
                        if inst.state().is_live() {
                            instances.push(inst.clone());
                        }
                    }
                }
            }
        }

        instances.extend(
            self.to_stop
                .iter()
                .filter(|i| i.state() == LifecycleState::Running)
                .cloned(),
        );
        instances.extend(self.kept.iter().filter(|i| i.is_external()).cloned());
        instances
    }

    /// Write the assembled container, or remove it if nothing is left.
    ///
    /// Marks the journal committed whatever the outcome.
    pub(crate) fn commit(&mut self) -> Result<CommitOutcome, StoreError> {
        self.committed = true;
        let instances = self.assemble();

        let same_contents = instances.len() == self.base_ids.len()
            && instances.iter().zip(&self.base_ids).all(|(i, id)| i.id() == *id);
        if !self.touched && same_contents && self.had_container != instances.is_empty() {
            return Ok(CommitOutcome::Unchanged);
        }

        if instances.is_empty() {
            if !self.had_container {
                return Ok(CommitOutcome::Unchanged);
            }
            let version = self.store.remove(&self.job, self.base_version)?;
            return Ok(CommitOutcome::Removed { version });
        }

        let external = instances.iter().filter(|i| i.is_external()).count();
        let managed = instances.len() - external;
        let version = self
            .store
            .store(TriggerContainer::new(self.job.clone(), instances), self.base_version)?;
        Ok(CommitOutcome::Stored {
            version,
            managed,
            external,
        })
    }
}

impl Drop for PassJournal {
    fn drop(&mut self) {
        if self.committed || !self.touched {
            return;
        }
        warn!(job = %self.job, "Reconciliation pass cancelled; committing partial state");
        if let Err(e) = self.commit() {
            error!(job = %self.job, error = %e, "Failed to commit partial reconciliation state");
        }
    }
}
