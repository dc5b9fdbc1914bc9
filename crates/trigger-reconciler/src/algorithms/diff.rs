//! # Equality/Diff Engine
//!
//! Partitions the current container against the desired specs.
//!
//! ## Algorithm
//!
//! 1. Resolve the kind of every desired spec and every managed instance.
//!    An unknown kind fails the whole diff before anything is touched.
//! 2. Walk the managed instances in container order. Each running instance
//!    claims the first unclaimed desired spec of its kind whose payload the
//!    kind's equality function accepts.
//! 3. Claimed instances are kept; unclaimed managed instances are stopped;
//!    unclaimed specs are started. External instances are always kept.
//!
//! Matching is one-to-one, so two equal specs need two instances.

use crate::domain::entities::{PlanSlot, ReconciliationPlan, TriggerInstance};
use crate::domain::errors::ReconcileError;
use crate::domain::value_objects::{LifecycleState, TriggerSpec};
use crate::registry::DescriptorRegistry;

/// Compute the reconciliation plan for `current` -> `desired`.
pub fn diff(
    registry: &DescriptorRegistry,
    current: &[TriggerInstance],
    desired: &[TriggerSpec],
) -> Result<ReconciliationPlan, ReconcileError> {
    let desired_descriptors = desired
        .iter()
        .map(|spec| registry.lookup(spec.kind()))
        .collect::<Result<Vec<_>, _>>()?;

    for inst in current.iter().filter(|i| !i.is_external()) {
        registry.lookup(inst.kind())?;
    }

    // claimed_by[d] = index into `current` of the instance satisfying desired[d]
    let mut claimed_by: Vec<Option<usize>> = vec![None; desired.len()];
    let mut to_stop = Vec::new();

    for (ci, inst) in current.iter().enumerate() {
        if inst.is_external() {
            continue;
        }

        // Only a running instance can stand in for a desired trigger.
        let claim = if inst.state() == LifecycleState::Running {
            desired.iter().enumerate().position(|(di, spec)| {
                claimed_by[di].is_none()
                    && spec.kind() == inst.kind()
                    && desired_descriptors[di].equals(inst.spec().config(), spec.config())
            })
        } else {
            None
        };

        match claim {
            Some(di) => claimed_by[di] = Some(ci),
            None => to_stop.push(inst.clone()),
        }
    }

    let mut plan = ReconciliationPlan {
        to_stop,
        ..Default::default()
    };

    for (di, spec) in desired.iter().enumerate() {
        match claimed_by[di] {
            Some(ci) => {
                plan.unchanged.push(current[ci].clone());
                plan.layout.push(PlanSlot::Keep(plan.unchanged.len() - 1));
            }
            None => {
                plan.to_start.push(spec.clone());
                plan.layout.push(PlanSlot::Start(plan.to_start.len() - 1));
            }
        }
    }

    plan.unchanged
        .extend(current.iter().filter(|i| i.is_external()).cloned());

    Ok(plan)
}
