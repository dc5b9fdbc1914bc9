//! `timer` trigger kind
//!
//! Fires at every minute of a cron schedule. The payload is the schedule
//! string, or `{ "spec": "<schedule>" }`. Two payloads are equal when their
//! schedules are equal after whitespace normalisation.

use super::schedule::{normalize, Schedule};
use super::{spawn_schedule, TaskSlot};
use crate::domain::errors::TriggerError;
use crate::domain::value_objects::{ConfigPayload, InstanceId, JobId};
use crate::ports::outbound::Trigger;
use crate::registry::{ConstructionContext, TriggerDescriptor};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;
use trigger_bus::{EventPublisher, FireCause, TriggerEvent};

pub const TIMER_KIND: &str = "timer";

/// Extract the schedule text from a timer payload.
pub fn timer_spec(payload: &ConfigPayload) -> Result<String, TriggerError> {
    match payload {
        ConfigPayload::String(spec) => Ok(spec.clone()),
        ConfigPayload::Object(map) => map
            .get("spec")
            .and_then(ConfigPayload::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                TriggerError::InvalidConfig("timer payload needs a 'spec' string".into())
            }),
        other => Err(TriggerError::InvalidConfig(format!(
            "timer payload must be a string or object, got {other}"
        ))),
    }
}

/// Equality for timer payloads.
pub fn timer_equality(a: &ConfigPayload, b: &ConfigPayload) -> bool {
    match (timer_spec(a), timer_spec(b)) {
        (Ok(x), Ok(y)) => normalize(&x) == normalize(&y),
        _ => a == b,
    }
}

/// Registry descriptor for the `timer` kind.
pub fn timer_descriptor() -> TriggerDescriptor {
    TriggerDescriptor::new(
        TIMER_KIND,
        Box::new(timer_equality),
        Box::new(|ctx: ConstructionContext| -> Result<Arc<dyn Trigger>, TriggerError> {
            Ok(Arc::new(TimerTrigger::from_context(ctx)?))
        }),
    )
}

/// A running cron timer.
pub struct TimerTrigger {
    job: JobId,
    instance: InstanceId,
    schedule: Schedule,
    publisher: Option<Arc<dyn EventPublisher>>,
    fires: Arc<AtomicU64>,
    task: TaskSlot,
}

impl TimerTrigger {
    pub fn new(
        job: JobId,
        instance: InstanceId,
        schedule: Schedule,
        publisher: Option<Arc<dyn EventPublisher>>,
    ) -> Self {
        Self {
            job,
            instance,
            schedule,
            publisher,
            fires: Arc::new(AtomicU64::new(0)),
            task: TaskSlot::default(),
        }
    }

    /// Build from a construction context; the job id seeds `H` tokens.
    pub fn from_context(ctx: ConstructionContext) -> Result<Self, TriggerError> {
        let spec = timer_spec(ctx.spec.config())?;
        let schedule = Schedule::parse(&spec, ctx.job.as_str())
            .map_err(|e| TriggerError::InvalidConfig(e.to_string()))?;
        Ok(Self::new(ctx.job, ctx.instance, schedule, ctx.publisher))
    }

    #[must_use]
    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.task.is_active()
    }

    /// Number of times this timer has fired.
    #[must_use]
    pub fn fire_count(&self) -> u64 {
        self.fires.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Trigger for TimerTrigger {
    async fn activate(&self) -> Result<(), TriggerError> {
        let started = self.task.start(|| {
            let job = self.job.clone();
            let instance = self.instance;
            let publisher = self.publisher.clone();
            let fires = self.fires.clone();

            spawn_schedule(self.schedule.clone(), move |scheduled_for| {
                let job = job.clone();
                let publisher = publisher.clone();
                fires.fetch_add(1, Ordering::Relaxed);
                async move {
                    debug!(job = %job, instance = %instance, %scheduled_for, "Timer fired");
                    if let Some(publisher) = publisher {
                        publisher
                            .publish(TriggerEvent::TriggerFired {
                                job: job.to_string(),
                                kind: TIMER_KIND.to_string(),
                                instance: instance.as_uuid(),
                                cause: FireCause::Schedule { scheduled_for },
                            })
                            .await;
                    }
                }
            })
        });

        if !started {
            return Err(TriggerError::Activation("timer already active".into()));
        }
        Ok(())
    }

    async fn deactivate(&self) -> Result<(), TriggerError> {
        self.task.stop();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::TriggerSpec;
    use serde_json::json;
    use std::time::Duration;
    use trigger_bus::{EventFilter, EventTopic, InMemoryEventBus};

    fn ctx(
        config: ConfigPayload,
        publisher: Option<Arc<dyn EventPublisher>>,
    ) -> ConstructionContext {
        ConstructionContext {
            job: JobId::from("nightly"),
            instance: InstanceId::new(),
            spec: TriggerSpec::new(TIMER_KIND, config),
            publisher,
        }
    }

    #[test]
    fn test_payload_forms() {
        assert_eq!(timer_spec(&json!("@daily")).unwrap(), "@daily");
        assert_eq!(timer_spec(&json!({"spec": "@hourly"})).unwrap(), "@hourly");
        assert!(timer_spec(&json!(42)).is_err());
        assert!(timer_spec(&json!({"cron": "@hourly"})).is_err());
    }

    #[test]
    fn test_equality_ignores_whitespace_and_form() {
        assert!(timer_equality(&json!("H  H * * *"), &json!({"spec": "H H * * *"})));
        assert!(!timer_equality(&json!("@daily"), &json!("@hourly")));
    }

    #[test]
    fn test_invalid_schedule_rejected_at_construction() {
        let err = TimerTrigger::from_context(ctx(json!("61 * * * *"), None)).err().unwrap();
        assert!(matches!(err, TriggerError::InvalidConfig(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_activate_fires_and_deactivate_stops() {
        let bus = Arc::new(InMemoryEventBus::new());
        let mut sub = bus.subscribe(EventFilter::topics(vec![EventTopic::Fire]));
        let timer = TimerTrigger::from_context(ctx(json!("* * * * *"), Some(bus.clone()))).unwrap();

        timer.activate().await.unwrap();
        assert!(timer.is_active());

        let event = sub.recv_timeout(Duration::from_secs(120)).await.unwrap();
        assert!(matches!(
            event,
            TriggerEvent::TriggerFired {
                cause: FireCause::Schedule { .. },
                ..
            }
        ));
        assert!(timer.fire_count() >= 1);

        timer.deactivate().await.unwrap();
        tokio::task::yield_now().await;
        assert!(!timer.is_active());
    }

    #[tokio::test]
    async fn test_double_activate_refused() {
        let timer = TimerTrigger::from_context(ctx(json!("@daily"), None)).unwrap();
        timer.activate().await.unwrap();
        assert!(timer.activate().await.is_err());
        timer.deactivate().await.unwrap();
    }
}
