//! # Lifecycle Controller
//!
//! Performs the start/stop side effects on individual trigger instances.
//!
//! - Starting is `Stopped -> Starting -> Running` around the trigger's
//!   `activate`. A failed or timed-out activation leaves the instance
//!   `Stopped`; a timed-out one is also deactivated to release whatever it
//!   had spawned.
//! - Stopping is `Running -> Stopping -> Stopped` around `deactivate`, and
//!   is a no-op for an instance that is already stopped or being stopped.
//!   A failed deactivation still ends in `Stopped`.
//!
//! Failures are returned as values; the caller decides whether to go on.

use super::EventSink;
use crate::config::ReconcilerConfig;
use crate::domain::entities::TriggerInstance;
use crate::domain::errors::ReconcileError;
use crate::domain::value_objects::{InstanceId, JobId, LifecycleState, TriggerKind, TriggerSpec};
use crate::metrics;
use crate::registry::{ConstructionContext, DescriptorRegistry};
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use trigger_bus::{EventPublisher, TriggerEvent};

/// Drives single trigger instances through their lifecycle.
pub struct LifecycleController {
    registry: Arc<DescriptorRegistry>,
    config: ReconcilerConfig,
    events: EventSink,
}

impl LifecycleController {
    pub fn new(registry: Arc<DescriptorRegistry>, config: ReconcilerConfig) -> Self {
        let events = EventSink::new(None, config.publish_events);
        Self {
            registry,
            config,
            events,
        }
    }

    /// Attach the bus that lifecycle events (and trigger fires) go to.
    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.events = EventSink::new(Some(publisher), self.config.publish_events);
        self
    }

    #[must_use]
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Construct a managed instance for `spec` without activating it.
    pub async fn prepare(
        &self,
        job: &JobId,
        spec: TriggerSpec,
    ) -> Result<TriggerInstance, ReconcileError> {
        let descriptor = self.registry.lookup(spec.kind())?;
        let id = InstanceId::new();

        let ctx = ConstructionContext {
            job: job.clone(),
            instance: id,
            spec: spec.clone(),
            publisher: self.events.publisher(),
        };

        match descriptor.construct(ctx) {
            Ok(trigger) => Ok(TriggerInstance::with_id(id, job.clone(), spec, trigger)),
            Err(e) => Err(self
                .activation_failed(job, spec.kind(), e.to_string())
                .await),
        }
    }

    /// Activate a prepared instance.
    pub async fn activate(&self, instance: &TriggerInstance) -> Result<(), ReconcileError> {
        if instance.is_external() {
            return Err(ReconcileError::ExternalTrigger {
                instance: instance.id(),
            });
        }

        instance.transition(LifecycleState::Starting)?;
        debug!(
            job = %instance.job(),
            kind = %instance.kind(),
            instance = %instance.id(),
            "Activating trigger"
        );

        let limit = self.config.activation_timeout();
        match timeout(limit, instance.trigger().activate()).await {
            Ok(Ok(())) => {
                if instance.transition(LifecycleState::Running).is_err() {
                    // Stopped by someone else while activating.
                    return Err(self
                        .activation_failed(
                            instance.job(),
                            instance.kind(),
                            "stopped during activation".into(),
                        )
                        .await);
                }
                metrics::record_start();
                info!(
                    job = %instance.job(),
                    kind = %instance.kind(),
                    instance = %instance.id(),
                    "Trigger started"
                );
                self.events
                    .emit(TriggerEvent::TriggerStarted {
                        job: instance.job().to_string(),
                        kind: instance.kind().to_string(),
                        instance: instance.id().as_uuid(),
                    })
                    .await;
                Ok(())
            }
            Ok(Err(e)) => {
                // Starting -> Stopped; fails only if a stop already claimed it.
                let _ = instance.transition(LifecycleState::Stopped);
                Err(self
                    .activation_failed(instance.job(), instance.kind(), e.to_string())
                    .await)
            }
            Err(_) => {
                self.release_abandoned(instance).await;
                Err(self
                    .activation_failed(
                        instance.job(),
                        instance.kind(),
                        format!("activation timed out after {}ms", limit.as_millis()),
                    )
                    .await)
            }
        }
    }

    /// Construct and activate a managed instance for `spec`.
    pub async fn start_instance(
        &self,
        job: &JobId,
        spec: TriggerSpec,
    ) -> Result<TriggerInstance, ReconcileError> {
        let instance = self.prepare(job, spec).await?;
        self.activate(&instance).await?;
        Ok(instance)
    }

    /// Deactivate an instance. Idempotent.
    pub async fn stop_instance(&self, instance: &TriggerInstance) -> Result<(), ReconcileError> {
        if instance.is_external() {
            return Err(ReconcileError::ExternalTrigger {
                instance: instance.id(),
            });
        }

        if !instance.begin_stop() {
            debug!(instance = %instance.id(), state = %instance.state(), "Trigger already stopped");
            return Ok(());
        }

        let limit = self.config.deactivation_timeout();
        let result = timeout(limit, instance.trigger().deactivate()).await;
        self.finish_stop(instance);

        let reason = match result {
            Ok(Ok(())) => {
                metrics::record_stop();
                info!(
                    job = %instance.job(),
                    kind = %instance.kind(),
                    instance = %instance.id(),
                    "Trigger stopped"
                );
                self.events
                    .emit(TriggerEvent::TriggerStopped {
                        job: instance.job().to_string(),
                        kind: instance.kind().to_string(),
                        instance: instance.id().as_uuid(),
                    })
                    .await;
                return Ok(());
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("deactivation timed out after {}ms", limit.as_millis()),
        };

        Err(self.deactivation_failed(instance, reason).await)
    }

    /// Best-effort deactivation of an instance whose activation never finished.
    async fn release_abandoned(&self, instance: &TriggerInstance) {
        if !instance.begin_stop() {
            return;
        }
        let limit = self.config.deactivation_timeout();
        match timeout(limit, instance.trigger().deactivate()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(
                    instance = %instance.id(),
                    error = %e,
                    "Cleanup after timed-out activation failed"
                );
            }
            Err(_) => {
                warn!(instance = %instance.id(), "Cleanup after timed-out activation timed out");
            }
        }
        self.finish_stop(instance);
    }

    fn finish_stop(&self, instance: &TriggerInstance) {
        if let Err(e) = instance.transition(LifecycleState::Stopped) {
            warn!(instance = %instance.id(), error = %e, "Unexpected state after deactivation");
        }
    }

    async fn activation_failed(
        &self,
        job: &JobId,
        kind: &TriggerKind,
        reason: String,
    ) -> ReconcileError {
        warn!(job = %job, kind = %kind, reason = %reason, "Trigger activation failed");
        metrics::record_activation_failure(kind.as_str());
        self.events
            .emit(TriggerEvent::ActivationFailed {
                job: job.to_string(),
                kind: kind.to_string(),
                reason: reason.clone(),
            })
            .await;
        ReconcileError::ActivationFailure {
            job: job.clone(),
            kind: kind.clone(),
            reason,
        }
    }

    async fn deactivation_failed(
        &self,
        instance: &TriggerInstance,
        reason: String,
    ) -> ReconcileError {
        warn!(
            job = %instance.job(),
            kind = %instance.kind(),
            instance = %instance.id(),
            reason = %reason,
            "Trigger deactivation failed; background work may have leaked"
        );
        metrics::record_deactivation_failure(instance.kind().as_str());
        self.events
            .emit(TriggerEvent::DeactivationFailed {
                job: instance.job().to_string(),
                kind: instance.kind().to_string(),
                instance: instance.id().as_uuid(),
                reason: reason.clone(),
            })
            .await;
        ReconcileError::DeactivationFailure {
            job: instance.job().clone(),
            kind: instance.kind().clone(),
            instance: instance.id(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TriggerError;
    use crate::ports::outbound::mocks::CountingTrigger;
    use crate::ports::Trigger;
    use crate::registry::TriggerDescriptor;
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use trigger_bus::{EventFilter, InMemoryEventBus};

    fn registry_with(trigger: Arc<CountingTrigger>) -> Arc<DescriptorRegistry> {
        let mut builder = DescriptorRegistry::builder();
        builder
            .register(TriggerDescriptor::with_value_equality(
                "counting",
                Box::new(
                    move |_ctx: ConstructionContext| -> Result<Arc<dyn Trigger>, TriggerError> {
                        Ok(trigger.clone())
                    },
                ),
            ))
            .unwrap()
            .register(TriggerDescriptor::with_value_equality(
                "broken",
                Box::new(|_ctx: ConstructionContext| -> Result<Arc<dyn Trigger>, TriggerError> {
                    Err(TriggerError::InvalidConfig("bad schedule".into()))
                }),
            ))
            .unwrap();
        Arc::new(builder.build())
    }

    fn controller(trigger: Arc<CountingTrigger>) -> LifecycleController {
        LifecycleController::new(registry_with(trigger), ReconcilerConfig::default())
    }

    fn job() -> JobId {
        JobId::from("nightly")
    }

    fn spec(kind: &str) -> TriggerSpec {
        TriggerSpec::new(kind, json!("@daily"))
    }

    #[tokio::test]
    async fn test_start_runs_instance() {
        let trigger = Arc::new(CountingTrigger::default());
        let controller = controller(trigger.clone());

        let instance = controller.start_instance(&job(), spec("counting")).await.unwrap();

        assert_eq!(instance.state(), LifecycleState::Running);
        assert_eq!(trigger.activations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_double_activate_rejected() {
        let trigger = Arc::new(CountingTrigger::default());
        let controller = controller(trigger.clone());

        let instance = controller.start_instance(&job(), spec("counting")).await.unwrap();
        let err = controller.activate(&instance).await.unwrap_err();

        assert!(matches!(err, ReconcileError::InvalidTransition { .. }));
        assert_eq!(trigger.activations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let trigger = Arc::new(CountingTrigger::default());
        let controller = controller(trigger.clone());
        let instance = controller.start_instance(&job(), spec("counting")).await.unwrap();

        controller.stop_instance(&instance).await.unwrap();
        controller.stop_instance(&instance).await.unwrap();

        assert_eq!(instance.state(), LifecycleState::Stopped);
        assert_eq!(trigger.deactivations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_activation_failure_leaves_stopped() {
        let trigger = Arc::new(CountingTrigger {
            fail_activate: true,
            ..Default::default()
        });
        let controller = controller(trigger);

        let instance = controller.prepare(&job(), spec("counting")).await.unwrap();
        let err = controller.activate(&instance).await.unwrap_err();

        assert!(matches!(err, ReconcileError::ActivationFailure { .. }));
        assert_eq!(instance.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_constructor_failure_is_activation_failure() {
        let controller = controller(Arc::new(CountingTrigger::default()));
        let err = controller.start_instance(&job(), spec("broken")).await.unwrap_err();
        match err {
            ReconcileError::ActivationFailure { reason, .. } => {
                assert!(reason.contains("bad schedule"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_kind_on_prepare() {
        let controller = controller(Arc::new(CountingTrigger::default()));
        let err = controller.prepare(&job(), spec("cron")).await.unwrap_err();
        assert!(matches!(err, ReconcileError::UnknownTriggerKind { .. }));
    }

    #[tokio::test]
    async fn test_deactivation_failure_still_stops() {
        let trigger = Arc::new(CountingTrigger {
            fail_deactivate: true,
            ..Default::default()
        });
        let controller = controller(trigger);
        let instance = controller.start_instance(&job(), spec("counting")).await.unwrap();

        let err = controller.stop_instance(&instance).await.unwrap_err();

        assert!(matches!(err, ReconcileError::DeactivationFailure { .. }));
        assert_eq!(instance.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_activation_timeout_releases_work() {
        let trigger = Arc::new(CountingTrigger {
            hang_activate: true,
            ..Default::default()
        });
        let config = ReconcilerConfig {
            activation_timeout_ms: 20,
            ..Default::default()
        };
        let controller = LifecycleController::new(registry_with(trigger.clone()), config);

        let err = controller.start_instance(&job(), spec("counting")).await.unwrap_err();

        match err {
            ReconcileError::ActivationFailure { reason, .. } => {
                assert!(reason.contains("timed out"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(trigger.deactivations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_external_refused() {
        let controller = controller(Arc::new(CountingTrigger::default()));
        let external = TriggerInstance::external(
            job(),
            spec("counting"),
            Arc::new(CountingTrigger::default()),
        );

        let err = controller.stop_instance(&external).await.unwrap_err();
        assert!(matches!(err, ReconcileError::ExternalTrigger { .. }));
        assert_eq!(external.state(), LifecycleState::Running);
    }

    #[tokio::test]
    async fn test_lifecycle_events_published() {
        let bus = Arc::new(InMemoryEventBus::new());
        let mut sub = bus.subscribe(EventFilter::all());
        let controller =
            controller(Arc::new(CountingTrigger::default())).with_publisher(bus.clone());

        let instance = controller.start_instance(&job(), spec("counting")).await.unwrap();
        controller.stop_instance(&instance).await.unwrap();

        let started = sub.recv_timeout(Duration::from_secs(1)).await.unwrap();
        let stopped = sub.recv_timeout(Duration::from_secs(1)).await.unwrap();
        assert!(matches!(started, TriggerEvent::TriggerStarted { .. }));
        assert!(matches!(stopped, TriggerEvent::TriggerStopped { .. }));
    }
}
