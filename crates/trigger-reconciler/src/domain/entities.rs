//! Core entities for trigger reconciliation

use super::errors::ReconcileError;
use super::value_objects::{InstanceId, JobId, LifecycleState, Provenance, TriggerKind, TriggerSpec};
use crate::ports::outbound::Trigger;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// A trigger instance: a spec bound to a live trigger implementation.
///
/// Clones share identity, lifecycle state and the underlying trigger, so a
/// clone held by a container and one held by an in-flight pass always agree
/// on the state.
#[derive(Clone)]
pub struct TriggerInstance {
    id: InstanceId,
    job: JobId,
    spec: TriggerSpec,
    provenance: Provenance,
    state: Arc<Mutex<LifecycleState>>,
    trigger: Arc<dyn Trigger>,
}

impl TriggerInstance {
    /// A reconciler-owned instance, initially stopped.
    pub fn managed(job: JobId, spec: TriggerSpec, trigger: Arc<dyn Trigger>) -> Self {
        Self::with_id(InstanceId::new(), job, spec, trigger)
    }

    /// A managed instance with a caller-chosen id.
    pub fn with_id(
        id: InstanceId,
        job: JobId,
        spec: TriggerSpec,
        trigger: Arc<dyn Trigger>,
    ) -> Self {
        Self {
            id,
            job,
            spec,
            provenance: Provenance::Managed,
            state: Arc::new(Mutex::new(LifecycleState::Stopped)),
            trigger,
        }
    }

    /// An instance registered by some other mechanism. Its lifecycle belongs
    /// to that mechanism, so it is recorded as already running.
    pub fn external(job: JobId, spec: TriggerSpec, trigger: Arc<dyn Trigger>) -> Self {
        Self {
            id: InstanceId::new(),
            job,
            spec,
            provenance: Provenance::External,
            state: Arc::new(Mutex::new(LifecycleState::Running)),
            trigger,
        }
    }

    #[must_use]
    pub fn id(&self) -> InstanceId {
        self.id
    }

    #[must_use]
    pub fn job(&self) -> &JobId {
        &self.job
    }

    #[must_use]
    pub fn spec(&self) -> &TriggerSpec {
        &self.spec
    }

    #[must_use]
    pub fn kind(&self) -> &TriggerKind {
        self.spec.kind()
    }

    #[must_use]
    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    #[must_use]
    pub fn is_external(&self) -> bool {
        self.provenance == Provenance::External
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// The trigger implementation backing this instance.
    #[must_use]
    pub fn trigger(&self) -> &Arc<dyn Trigger> {
        &self.trigger
    }

    /// Atomically move to `to`, returning the previous state.
    pub fn transition(&self, to: LifecycleState) -> Result<LifecycleState, ReconcileError> {
        let mut state = self.state.lock();
        let from = *state;
        if !from.can_transition_to(to) {
            return Err(ReconcileError::InvalidTransition {
                instance: self.id,
                from,
                to,
            });
        }
        *state = to;
        Ok(from)
    }

    /// Claim the stop of this instance.
    ///
    /// Returns `true` if the caller moved it to `Stopping` and must now
    /// deactivate it; `false` if it is already stopped or being stopped.
    pub(crate) fn begin_stop(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            LifecycleState::Running | LifecycleState::Starting => {
                *state = LifecycleState::Stopping;
                true
            }
            LifecycleState::Stopping | LifecycleState::Stopped => false,
        }
    }

    /// Same instance (identity, not value).
    #[must_use]
    pub fn same_instance(&self, other: &TriggerInstance) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for TriggerInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerInstance")
            .field("id", &self.id)
            .field("job", &self.job)
            .field("spec", &self.spec)
            .field("provenance", &self.provenance)
            .field("state", &self.state())
            .finish()
    }
}

/// The committed trigger set of one job.
///
/// A job without triggers has no container at all; stores refuse to persist
/// an empty one.
#[derive(Clone, Debug)]
pub struct TriggerContainer {
    job: JobId,
    instances: Vec<TriggerInstance>,
}

impl TriggerContainer {
    pub fn new(job: JobId, instances: Vec<TriggerInstance>) -> Self {
        Self { job, instances }
    }

    #[must_use]
    pub fn job(&self) -> &JobId {
        &self.job
    }

    #[must_use]
    pub fn instances(&self) -> &[TriggerInstance] {
        &self.instances
    }

    pub fn into_instances(self) -> Vec<TriggerInstance> {
        self.instances
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn managed(&self) -> impl Iterator<Item = &TriggerInstance> {
        self.instances.iter().filter(|i| !i.is_external())
    }

    pub fn external(&self) -> impl Iterator<Item = &TriggerInstance> {
        self.instances.iter().filter(|i| i.is_external())
    }

    /// First instance of the given kind, in container order.
    #[must_use]
    pub fn trigger_for_kind(&self, kind: &TriggerKind) -> Option<&TriggerInstance> {
        self.instances.iter().find(|i| i.kind() == kind)
    }

    #[must_use]
    pub fn get(&self, id: InstanceId) -> Option<&TriggerInstance> {
        self.instances.iter().find(|i| i.id() == id)
    }
}

/// Where a desired position of the next container comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlanSlot {
    /// Satisfied by `unchanged[index]`.
    Keep(usize),
    /// Satisfied by starting `to_start[index]`.
    Start(usize),
}

/// The outcome of diffing the current container against the desired specs.
///
/// `unchanged` holds matched managed instances in desired order followed by
/// every external instance in its prior order. `layout` has one slot per
/// desired spec.
#[derive(Clone, Debug, Default)]
pub struct ReconciliationPlan {
    pub unchanged: Vec<TriggerInstance>,
    pub to_stop: Vec<TriggerInstance>,
    pub to_start: Vec<TriggerSpec>,
    pub layout: Vec<PlanSlot>,
}

impl ReconciliationPlan {
    /// Whether applying this plan has no lifecycle side effects.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.to_stop.is_empty() && self.to_start.is_empty()
    }

    pub fn external(&self) -> impl Iterator<Item = &TriggerInstance> {
        self.unchanged.iter().filter(|i| i.is_external())
    }
}

/// What a reconciliation pass did.
#[derive(Clone, Debug)]
pub struct ReconcileReport {
    pub job: JobId,
    /// Instances carried over untouched, externals included.
    pub kept: Vec<InstanceId>,
    pub started: Vec<InstanceId>,
    pub stopped: Vec<InstanceId>,
    /// `ActivationFailure`s; the affected specs are not in the container.
    pub activation_failures: Vec<ReconcileError>,
    /// `DeactivationFailure`s; the instances were removed regardless.
    pub deactivation_failures: Vec<ReconcileError>,
    /// Whether the job has a container after the pass.
    pub container_present: bool,
}

impl ReconcileReport {
    pub fn new(job: JobId) -> Self {
        Self {
            job,
            kept: Vec::new(),
            started: Vec::new(),
            stopped: Vec::new(),
            activation_failures: Vec::new(),
            deactivation_failures: Vec::new(),
            container_present: false,
        }
    }

    /// Whether any trigger was started or stopped.
    #[must_use]
    pub fn had_side_effects(&self) -> bool {
        !self.started.is_empty() || !self.stopped.is_empty()
    }

    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.activation_failures.is_empty() || !self.deactivation_failures.is_empty()
    }
}
