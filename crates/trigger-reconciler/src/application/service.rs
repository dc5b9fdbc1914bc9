//! Trigger Container Manager
//!
//! Main service implementing TriggerReconciliationApi.
//!
//! A pass holds the job's lock from load to commit, so two passes for the
//! same job never both start the same desired trigger. Passes for different
//! jobs run independently. The commit itself is still version-checked
//! against the store, which catches writers outside this process.

use super::journal::{CommitOutcome, PassJournal};
use super::lifecycle::LifecycleController;
use super::EventSink;
use crate::algorithms::diff;
use crate::config::ReconcilerConfig;
use crate::domain::entities::{ReconcileReport, TriggerContainer, TriggerInstance};
use crate::domain::errors::ReconcileError;
use crate::domain::invariants::{invariant_externals_preserved, invariant_partition_complete};
use crate::domain::value_objects::{InstanceId, JobId, TriggerSpec};
use crate::metrics;
use crate::ports::inbound::TriggerReconciliationApi;
use crate::ports::outbound::ContainerStore;
use crate::registry::DescriptorRegistry;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, info_span, warn, Instrument};
use trigger_bus::{EventPublisher, TriggerEvent};

/// Trigger Container Manager
///
/// Orchestrates a reconciliation pass:
/// 1. Lock the job
/// 2. Load its container
/// 3. Diff against the desired specs
/// 4. Stop, then start, recording every step in the pass journal
/// 5. Commit the new container or remove it
pub struct TriggerContainerManager {
    registry: Arc<DescriptorRegistry>,
    store: Arc<dyn ContainerStore>,
    config: ReconcilerConfig,
    publisher: Option<Arc<dyn EventPublisher>>,
    lifecycle: LifecycleController,
    events: EventSink,
    locks: Mutex<HashMap<JobId, Arc<AsyncMutex<()>>>>,
}

impl TriggerContainerManager {
    /// Create a manager with default config
    pub fn new(registry: Arc<DescriptorRegistry>, store: Arc<dyn ContainerStore>) -> Self {
        let config = ReconcilerConfig::default();
        Self {
            lifecycle: LifecycleController::new(registry.clone(), config.clone()),
            events: EventSink::new(None, config.publish_events),
            registry,
            store,
            config,
            publisher: None,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the config
    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self.rebuild_lifecycle();
        self
    }

    /// Publish lifecycle, container and fire events to `publisher`
    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self.rebuild_lifecycle();
        self
    }

    fn rebuild_lifecycle(&mut self) {
        let mut lifecycle = LifecycleController::new(self.registry.clone(), self.config.clone());
        if let Some(publisher) = &self.publisher {
            lifecycle = lifecycle.with_publisher(publisher.clone());
        }
        self.lifecycle = lifecycle;
        self.events = EventSink::new(self.publisher.clone(), self.config.publish_events);
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<DescriptorRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn lifecycle(&self) -> &LifecycleController {
        &self.lifecycle
    }

    #[must_use]
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    fn job_lock(&self, job: &JobId) -> Arc<AsyncMutex<()>> {
        self.locks.lock().entry(job.clone()).or_default().clone()
    }

    /// Forget the job's lock once it has no container and nobody holds or
    /// awaits the lock. `job_lock` clones under the same map lock, so a count
    /// of one cannot race a new waiter.
    fn prune_job_lock(&self, job: &JobId) {
        let mut locks = self.locks.lock();
        if !locks.get(job).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            return;
        }
        match self.store.load(job) {
            Ok(snapshot) if snapshot.container.is_none() => {
                locks.remove(job);
                debug!(job = %job, "Released job lock");
            }
            Ok(_) => {}
            Err(err) => debug!(job = %job, error = %err, "Keeping job lock; store unavailable"),
        }
    }

    async fn reconcile_locked(
        &self,
        job: &JobId,
        desired: Vec<TriggerSpec>,
    ) -> Result<ReconcileReport, ReconcileError> {
        let lock = self.job_lock(job);
        let _guard = lock.lock().await;

        let snapshot = self.store.load(job)?;
        let had_container = snapshot.container.is_some();
        let current = snapshot
            .container
            .map(TriggerContainer::into_instances)
            .unwrap_or_default();

        let plan = diff(&self.registry, &current, &desired)?;
        debug_assert!(invariant_externals_preserved(&current, &plan));
        debug_assert!(invariant_partition_complete(&current, &plan));
        debug!(
            kept = plan.unchanged.len(),
            to_stop = plan.to_stop.len(),
            to_start = plan.to_start.len(),
            "Computed reconciliation plan"
        );

        let mut report = ReconcileReport::new(job.clone());
        report.kept = plan.unchanged.iter().map(TriggerInstance::id).collect();

        // Declared after the guard so it is dropped, and commits, first.
        let mut journal = PassJournal::new(
            self.store.clone(),
            job.clone(),
            snapshot.version,
            &current,
            had_container,
            &plan,
        );

        for instance in &plan.to_stop {
            journal.record_stop_attempt();
            if let Err(err) = self.lifecycle.stop_instance(instance).await {
                report.deactivation_failures.push(err);
            }
            report.stopped.push(instance.id());
        }

        for (slot, spec) in plan.to_start.iter().enumerate() {
            let instance = match self.lifecycle.prepare(job, spec.clone()).await {
                Ok(instance) => instance,
                Err(err) => {
                    report.activation_failures.push(err);
                    continue;
                }
            };
            journal.record_prepared(slot, instance.clone());
            match self.lifecycle.activate(&instance).await {
                Ok(()) => report.started.push(instance.id()),
                Err(err) => report.activation_failures.push(err),
            }
        }

        let outcome = match journal.commit() {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %err, "Commit failed; stopping triggers started by this pass");
                for instance in journal.started_instances() {
                    if let Err(e) = self.lifecycle.stop_instance(&instance).await {
                        error!(
                            instance = %instance.id(),
                            error = %e,
                            "Failed to stop uncommitted trigger"
                        );
                    }
                }
                return Err(err.into());
            }
        };

        match outcome {
            CommitOutcome::Stored {
                version,
                managed,
                external,
            } => {
                report.container_present = true;
                info!(
                    version,
                    managed,
                    external,
                    started = report.started.len(),
                    stopped = report.stopped.len(),
                    "Committed trigger container"
                );
                self.events
                    .emit(TriggerEvent::ContainerCommitted {
                        job: job.to_string(),
                        managed,
                        external,
                    })
                    .await;
            }
            CommitOutcome::Removed { version } => {
                report.container_present = false;
                metrics::record_container_removed();
                info!(version, stopped = report.stopped.len(), "Removed trigger container");
                self.events
                    .emit(TriggerEvent::ContainerRemoved { job: job.to_string() })
                    .await;
            }
            CommitOutcome::Unchanged => {
                report.container_present = had_container;
                debug!("Trigger container unchanged");
            }
        }

        Ok(report)
    }

    async fn stop_job(&self, job: &JobId) -> Result<ReconcileReport, ReconcileError> {
        let lock = self.job_lock(job);
        let _guard = lock.lock().await;

        let mut report = ReconcileReport::new(job.clone());
        let Some(container) = self.store.load(job)?.container else {
            return Ok(report);
        };
        report.container_present = true;

        for instance in container.instances() {
            if instance.is_external() || !instance.state().is_live() {
                report.kept.push(instance.id());
                continue;
            }
            if let Err(err) = self.lifecycle.stop_instance(instance).await {
                report.deactivation_failures.push(err);
            }
            report.stopped.push(instance.id());
        }

        Ok(report)
    }

    async fn remove_external_locked(
        &self,
        job: &JobId,
        id: InstanceId,
    ) -> Result<bool, ReconcileError> {
        let lock = self.job_lock(job);
        let _guard = lock.lock().await;

        let snapshot = self.store.load(job)?;
        let Some(container) = snapshot.container else {
            return Ok(false);
        };
        let mut instances = container.into_instances();
        let Some(pos) = instances.iter().position(|i| i.id() == id) else {
            return Ok(false);
        };
        if !instances[pos].is_external() {
            return Err(ReconcileError::NotExternal { instance: id });
        }

        instances.remove(pos);
        info!(job = %job, instance = %id, "Removed external trigger");

        if instances.is_empty() {
            self.store.remove(job, snapshot.version)?;
            metrics::record_container_removed();
            self.events
                .emit(TriggerEvent::ContainerRemoved { job: job.to_string() })
                .await;
        } else {
            let external = instances.iter().filter(|i| i.is_external()).count();
            let managed = instances.len() - external;
            self.store
                .store(TriggerContainer::new(job.clone(), instances), snapshot.version)?;
            self.events
                .emit(TriggerEvent::ContainerCommitted {
                    job: job.to_string(),
                    managed,
                    external,
                })
                .await;
        }
        Ok(true)
    }

    fn outcome_label(result: &Result<ReconcileReport, ReconcileError>) -> &'static str {
        match result {
            Ok(report) if report.has_failures() => "partial",
            Ok(_) => "committed",
            Err(ReconcileError::ConcurrentReconciliationConflict { .. }) => "conflict",
            Err(ReconcileError::UnknownTriggerKind { .. }) => "unknown_kind",
            Err(_) => "error",
        }
    }
}

#[async_trait]
impl TriggerReconciliationApi for TriggerContainerManager {
    async fn reconcile(
        &self,
        job: &JobId,
        desired: Vec<TriggerSpec>,
    ) -> Result<ReconcileReport, ReconcileError> {
        let started_at = Instant::now();
        let span = info_span!("reconcile", job = %job);

        let result = self.reconcile_locked(job, desired).instrument(span).await;
        if !matches!(&result, Ok(report) if report.container_present) {
            self.prune_job_lock(job);
        }

        metrics::record_reconciliation(
            Self::outcome_label(&result),
            started_at.elapsed().as_secs_f64(),
        );
        if let Err(err) = &result {
            warn!(job = %job, error = %err, "Reconciliation failed");
        }
        result
    }

    async fn add_external(
        &self,
        job: &JobId,
        instance: TriggerInstance,
    ) -> Result<(), ReconcileError> {
        if !instance.is_external() {
            return Err(ReconcileError::NotExternal {
                instance: instance.id(),
            });
        }

        let lock = self.job_lock(job);
        let _guard = lock.lock().await;

        let snapshot = self.store.load(job)?;
        let mut instances = snapshot
            .container
            .map(TriggerContainer::into_instances)
            .unwrap_or_default();
        if instances.iter().any(|i| i.same_instance(&instance)) {
            return Ok(());
        }

        info!(
            job = %job,
            kind = %instance.kind(),
            instance = %instance.id(),
            "Adding external trigger"
        );
        instances.push(instance);
        let external = instances.iter().filter(|i| i.is_external()).count();
        let managed = instances.len() - external;
        self.store
            .store(TriggerContainer::new(job.clone(), instances), snapshot.version)?;

        self.events
            .emit(TriggerEvent::ContainerCommitted {
                job: job.to_string(),
                managed,
                external,
            })
            .await;
        Ok(())
    }

    async fn remove_external(&self, job: &JobId, id: InstanceId) -> Result<bool, ReconcileError> {
        let removed = self.remove_external_locked(job, id).await;
        if matches!(removed, Ok(true)) {
            self.prune_job_lock(job);
        }
        removed
    }

    fn container(&self, job: &JobId) -> Result<Option<TriggerContainer>, ReconcileError> {
        Ok(self.store.load(job)?.container)
    }

    fn jobs(&self) -> Result<Vec<JobId>, ReconcileError> {
        Ok(self.store.jobs()?)
    }

    async fn stop_all(&self) -> Result<Vec<ReconcileReport>, ReconcileError> {
        let jobs = self.store.jobs()?;
        info!(jobs = jobs.len(), "Stopping all managed triggers");

        let mut reports = Vec::with_capacity(jobs.len());
        for job in jobs {
            match self.stop_job(&job).await {
                Ok(report) => reports.push(report),
                Err(err) => warn!(job = %job, error = %err, "Failed to stop triggers of job"),
            }
        }
        Ok(reports)
    }
}
