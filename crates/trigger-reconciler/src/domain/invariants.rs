//! Domain invariants for trigger reconciliation

use super::entities::{PlanSlot, ReconciliationPlan, TriggerContainer, TriggerInstance};
use super::value_objects::InstanceId;
use std::collections::HashSet;

/// INVARIANT-1: External Exemption
/// Every external instance of `current` is in `unchanged` and none is in `to_stop`.
pub fn invariant_externals_preserved(
    current: &[TriggerInstance],
    plan: &ReconciliationPlan,
) -> bool {
    if plan.to_stop.iter().any(TriggerInstance::is_external) {
        return false;
    }
    current
        .iter()
        .filter(|i| i.is_external())
        .all(|ext| plan.unchanged.iter().any(|u| u.same_instance(ext)))
}

/// INVARIANT-2: Partition
/// Each current instance lands in exactly one of `unchanged` or `to_stop`,
/// and nothing else does.
pub fn invariant_partition_complete(
    current: &[TriggerInstance],
    plan: &ReconciliationPlan,
) -> bool {
    let mut seen: HashSet<InstanceId> = HashSet::new();
    for inst in plan.unchanged.iter().chain(plan.to_stop.iter()) {
        if !seen.insert(inst.id()) {
            return false;
        }
    }
    seen.len() == current.len() && current.iter().all(|i| seen.contains(&i.id()))
}

/// INVARIANT-3: Layout
/// One slot per desired spec; every kept managed instance and every spec to
/// start is referenced exactly once.
pub fn invariant_layout_covers_desired(plan: &ReconciliationPlan, desired_len: usize) -> bool {
    if plan.layout.len() != desired_len {
        return false;
    }

    let managed_kept = plan.unchanged.iter().filter(|i| !i.is_external()).count();
    let mut keep_refs = vec![0usize; plan.unchanged.len()];
    let mut start_refs = vec![0usize; plan.to_start.len()];

    for slot in &plan.layout {
        match *slot {
            PlanSlot::Keep(i) => match keep_refs.get_mut(i) {
                Some(n) if !plan.unchanged[i].is_external() => *n += 1,
                _ => return false,
            },
            PlanSlot::Start(i) => match start_refs.get_mut(i) {
                Some(n) => *n += 1,
                None => return false,
            },
        }
    }

    keep_refs.iter().filter(|&&n| n == 1).count() == managed_kept
        && keep_refs.iter().all(|&n| n <= 1)
        && start_refs.iter().all(|&n| n == 1)
}

/// INVARIANT-4: No Empty Shell
/// A committed container always holds at least one instance.
pub fn invariant_no_empty_container(container: Option<&TriggerContainer>) -> bool {
    container.map_or(true, |c| !c.is_empty())
}

/// INVARIANT-5: Unique Instances
/// No instance appears twice in a container.
pub fn invariant_unique_instances(container: &TriggerContainer) -> bool {
    let mut seen = HashSet::new();
    container.instances().iter().all(|i| seen.insert(i.id()))
}
