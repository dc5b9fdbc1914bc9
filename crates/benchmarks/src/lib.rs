//! Fixtures shared by the reconciler benchmarks.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use trigger_reconciler::{
    ConstructionContext, DescriptorRegistry, JobId, LifecycleState, Trigger, TriggerDescriptor,
    TriggerError, TriggerInstance, TriggerSpec,
};

/// Kinds registered by [`registry`].
pub const KINDS: [&str; 4] = ["timer", "scm-poll", "upstream", "cron-alias"];

/// Trigger whose activation and deactivation cost nothing.
pub struct IdleTrigger;

#[async_trait]
impl Trigger for IdleTrigger {
    async fn activate(&self) -> Result<(), TriggerError> {
        Ok(())
    }

    async fn deactivate(&self) -> Result<(), TriggerError> {
        Ok(())
    }
}

/// Registry of [`KINDS`], all value-compared and built as [`IdleTrigger`].
pub fn registry() -> DescriptorRegistry {
    let mut builder = DescriptorRegistry::builder();
    for kind in KINDS {
        builder
            .register(TriggerDescriptor::with_value_equality(
                kind,
                Box::new(|_ctx: ConstructionContext| -> Result<Arc<dyn Trigger>, TriggerError> {
                    Ok(Arc::new(IdleTrigger))
                }),
            ))
            .expect("distinct kinds");
    }
    builder.build()
}

/// `n` specs cycling through the kinds, each with a distinct payload.
pub fn specs(n: usize) -> Vec<TriggerSpec> {
    (0..n)
        .map(|i| {
            let payload = json!({ "spec": format!("H/{} * * * *", i % 60 + 1), "n": i });
            TriggerSpec::new(KINDS[i % KINDS.len()], payload)
        })
        .collect()
}

/// Running managed instances for `specs`.
pub fn running(job: &JobId, specs: &[TriggerSpec]) -> Vec<TriggerInstance> {
    specs
        .iter()
        .map(|spec| {
            let instance =
                TriggerInstance::managed(job.clone(), spec.clone(), Arc::new(IdleTrigger));
            instance.transition(LifecycleState::Starting).expect("stopped -> starting");
            instance.transition(LifecycleState::Running).expect("starting -> running");
            instance
        })
        .collect()
}
