//! Shared harness for the reconciler integration tests.
//!
//! The `test` trigger kind records every activation and deactivation. Its
//! payload is a label string; behaviour (failure, blocking) is injected per
//! label through the [`Recorder`].

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use trigger_reconciler::{
    ConfigPayload, ConstructionContext, DescriptorRegistry, InMemoryContainerStore, InstanceId,
    JobId, ReconcilerConfig, Trigger, TriggerContainerManager, TriggerDescriptor, TriggerError,
    TriggerInstance, TriggerSpec,
};

pub const TEST_KIND: &str = "test";
pub const EXTERNAL_KIND: &str = "scm-poll";

// =============================================================================
// RECORDER
// =============================================================================

/// Per-instance view, the equivalent of a trigger's own start counter.
#[derive(Debug, Default)]
pub struct InstanceProbe {
    starts: AtomicUsize,
    started: AtomicBool,
}

impl InstanceProbe {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Activate(String),
    Deactivate(String),
}

#[derive(Default)]
pub struct Recorder {
    calls: Mutex<Vec<Call>>,
    probes: Mutex<HashMap<InstanceId, Arc<InstanceProbe>>>,
    failing_activations: Mutex<HashSet<String>>,
    failing_deactivations: Mutex<HashSet<String>>,
    blocked: Mutex<HashSet<String>>,
    entered: Notify,
    release: Notify,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn activations(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::Activate(_))).count()
    }

    pub fn deactivations(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::Deactivate(_))).count()
    }

    pub fn activations_of(&self, label: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Activate(l) if l == label))
            .count()
    }

    pub fn deactivations_of(&self, label: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Deactivate(l) if l == label))
            .count()
    }

    /// Instances currently started, across all jobs.
    pub fn live(&self) -> usize {
        self.probes.lock().values().filter(|p| p.is_started()).count()
    }

    pub fn probe(&self, id: InstanceId) -> Arc<InstanceProbe> {
        self.probes.lock().entry(id).or_default().clone()
    }

    pub fn fail_activation(&self, label: &str) {
        self.failing_activations.lock().insert(label.to_string());
    }

    pub fn recover_activation(&self, label: &str) {
        self.failing_activations.lock().remove(label);
    }

    pub fn fail_deactivation(&self, label: &str) {
        self.failing_deactivations.lock().insert(label.to_string());
    }

    /// Activations of `label` wait until [`Recorder::release`] is called.
    pub fn block_activation(&self, label: &str) {
        self.blocked.lock().insert(label.to_string());
    }

    pub fn release(&self) {
        self.blocked.lock().clear();
        self.release.notify_one();
    }

    /// Resolves once a blocked activation has begun.
    pub async fn wait_blocked(&self) {
        self.entered.notified().await;
    }
}

struct RecordingTrigger {
    label: String,
    probe: Arc<InstanceProbe>,
    recorder: Arc<Recorder>,
}

#[async_trait]
impl Trigger for RecordingTrigger {
    async fn activate(&self) -> Result<(), TriggerError> {
        self.recorder.calls.lock().push(Call::Activate(self.label.clone()));

        let blocked = self.recorder.blocked.lock().contains(&self.label);
        if blocked {
            self.recorder.entered.notify_one();
            self.recorder.release.notified().await;
        }

        if self.recorder.failing_activations.lock().contains(&self.label) {
            return Err(TriggerError::Activation(format!("{} refused to start", self.label)));
        }
        self.probe.starts.fetch_add(1, Ordering::SeqCst);
        self.probe.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn deactivate(&self) -> Result<(), TriggerError> {
        self.recorder.calls.lock().push(Call::Deactivate(self.label.clone()));
        self.probe.started.store(false, Ordering::SeqCst);

        if self.recorder.failing_deactivations.lock().contains(&self.label) {
            return Err(TriggerError::Deactivation(format!("{} leaked its timer", self.label)));
        }
        Ok(())
    }
}

/// Descriptor for the recording `test` kind.
pub fn recording_descriptor(recorder: Arc<Recorder>) -> TriggerDescriptor {
    TriggerDescriptor::with_value_equality(
        TEST_KIND,
        Box::new(move |ctx: ConstructionContext| -> Result<Arc<dyn Trigger>, TriggerError> {
            let label = label_of(ctx.spec.config());
            Ok(Arc::new(RecordingTrigger {
                probe: recorder.probe(ctx.instance),
                label,
                recorder: recorder.clone(),
            }))
        }),
    )
}

fn label_of(config: &ConfigPayload) -> String {
    config.as_str().map_or_else(|| config.to_string(), str::to_string)
}

// =============================================================================
// HARNESS
// =============================================================================

pub struct Harness {
    pub manager: Arc<TriggerContainerManager>,
    pub store: Arc<InMemoryContainerStore>,
    pub recorder: Arc<Recorder>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ReconcilerConfig::default())
    }

    pub fn with_config(config: ReconcilerConfig) -> Self {
        let recorder = Recorder::new();
        let mut builder = DescriptorRegistry::builder();
        builder
            .register(recording_descriptor(recorder.clone()))
            .expect("register test kind")
            .register(TriggerDescriptor::with_value_equality(
                EXTERNAL_KIND,
                Box::new(|_ctx: ConstructionContext| -> Result<Arc<dyn Trigger>, TriggerError> {
                    Err(TriggerError::InvalidConfig("not constructed in tests".into()))
                }),
            ))
            .expect("register external kind");

        let store = Arc::new(InMemoryContainerStore::new());
        let manager = TriggerContainerManager::new(Arc::new(builder.build()), store.clone())
            .with_config(config);
        Self {
            manager: Arc::new(manager),
            store,
            recorder,
        }
    }

    /// An External instance backed by a recording trigger, so any stop on it would show.
    pub fn external(&self, job: &JobId, spec: &str) -> TriggerInstance {
        let trigger = Arc::new(RecordingTrigger {
            label: format!("external:{spec}"),
            probe: Arc::new(InstanceProbe::default()),
            recorder: self.recorder.clone(),
        });
        let spec = TriggerSpec::new(EXTERNAL_KIND, json!(spec));
        TriggerInstance::external(job.clone(), spec, trigger)
    }
}

pub fn job(name: &str) -> JobId {
    JobId::from(name)
}

pub fn test_spec(label: &str) -> TriggerSpec {
    TriggerSpec::new(TEST_KIND, json!(label))
}

pub fn specs(labels: &[&str]) -> Vec<TriggerSpec> {
    labels.iter().map(|l| test_spec(l)).collect()
}

/// Labels of the committed container, in container order.
pub fn labels(harness: &Harness, job: &JobId) -> Vec<String> {
    use trigger_reconciler::TriggerReconciliationApi;
    harness
        .manager
        .container(job)
        .expect("load container")
        .map(|c| c.instances().iter().map(|i| label_of(i.spec().config())).collect())
        .unwrap_or_default()
}
