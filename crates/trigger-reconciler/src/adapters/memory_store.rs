//! In-memory container store
//!
//! Keeps a version per job that survives removal, so optimistic commits can
//! tell "never had a container" apart from "container removed since load".

use crate::domain::entities::TriggerContainer;
use crate::domain::errors::StoreError;
use crate::domain::value_objects::JobId;
use crate::ports::outbound::{ContainerSnapshot, ContainerStore};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
struct Slot {
    container: Option<TriggerContainer>,
    version: u64,
}

/// `ContainerStore` backed by a map.
#[derive(Default)]
pub struct InMemoryContainerStore {
    slots: RwLock<HashMap<JobId, Slot>>,
}

impl InMemoryContainerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current version of the job's slot (0 if never written).
    #[must_use]
    pub fn version(&self, job: &JobId) -> u64 {
        self.slots.read().get(job).map_or(0, |s| s.version)
    }

    fn check(job: &JobId, slot: &Slot, expected: u64) -> Result<(), StoreError> {
        if slot.version != expected {
            return Err(StoreError::VersionMismatch {
                job: job.clone(),
                expected,
                actual: slot.version,
            });
        }
        Ok(())
    }
}

impl ContainerStore for InMemoryContainerStore {
    fn load(&self, job: &JobId) -> Result<ContainerSnapshot, StoreError> {
        let slots = self.slots.read();
        Ok(slots
            .get(job)
            .map(|slot| ContainerSnapshot {
                container: slot.container.clone(),
                version: slot.version,
            })
            .unwrap_or_default())
    }

    fn store(&self, container: TriggerContainer, expected_version: u64) -> Result<u64, StoreError> {
        let job = container.job().clone();
        if container.is_empty() {
            return Err(StoreError::EmptyContainer { job });
        }
        let mut slots = self.slots.write();
        let slot = slots.entry(job.clone()).or_default();
        Self::check(&job, slot, expected_version)?;

        slot.container = Some(container);
        slot.version += 1;
        Ok(slot.version)
    }

    fn remove(&self, job: &JobId, expected_version: u64) -> Result<u64, StoreError> {
        let mut slots = self.slots.write();
        let slot = slots.entry(job.clone()).or_default();
        Self::check(job, slot, expected_version)?;

        slot.container = None;
        slot.version += 1;
        Ok(slot.version)
    }

    fn jobs(&self) -> Result<Vec<JobId>, StoreError> {
        let slots = self.slots.read();
        let mut jobs: Vec<_> = slots
            .iter()
            .filter(|(_, slot)| slot.container.is_some())
            .map(|(job, _)| job.clone())
            .collect();
        jobs.sort();
        Ok(jobs)
    }
}
