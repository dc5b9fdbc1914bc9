//! `scm-poll` trigger kind
//!
//! Polls the job's repository on a cron schedule and fires when the head
//! revision moves. The first successful poll only records a baseline.
//!
//! Payload: a schedule string, or
//! `{ "spec": "<schedule>", "ignore_post_commit_hooks": false }`.
//!
//! There is no post-commit notification path, so `ignore_post_commit_hooks`
//! changes no polling behaviour. It only takes part in equality: flipping it
//! replaces the running trigger.

use super::schedule::{normalize, Schedule};
use super::{spawn_schedule, TaskSlot};
use crate::domain::errors::TriggerError;
use crate::domain::value_objects::{ConfigPayload, InstanceId, JobId};
use crate::ports::outbound::{ScmProbe, Trigger};
use crate::registry::{ConstructionContext, TriggerDescriptor};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use trigger_bus::{EventPublisher, FireCause, TriggerEvent};

pub const SCM_POLL_KIND: &str = "scm-poll";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScmPollConfig {
    pub spec: String,
    /// Part of the trigger's identity only; polling ignores it.
    #[serde(default)]
    pub ignore_post_commit_hooks: bool,
}

impl ScmPollConfig {
    pub fn from_payload(payload: &ConfigPayload) -> Result<Self, TriggerError> {
        match payload {
            ConfigPayload::String(spec) => Ok(Self {
                spec: spec.clone(),
                ignore_post_commit_hooks: false,
            }),
            ConfigPayload::Object(_) => serde_json::from_value(payload.clone())
                .map_err(|e| TriggerError::InvalidConfig(format!("scm-poll payload: {e}"))),
            other => Err(TriggerError::InvalidConfig(format!(
                "scm-poll payload must be a string or object, got {other}"
            ))),
        }
    }
}

/// Equality for scm-poll payloads: normalised schedule plus the hook flag.
pub fn scm_poll_equality(a: &ConfigPayload, b: &ConfigPayload) -> bool {
    match (ScmPollConfig::from_payload(a), ScmPollConfig::from_payload(b)) {
        (Ok(x), Ok(y)) => {
            normalize(&x.spec) == normalize(&y.spec)
                && x.ignore_post_commit_hooks == y.ignore_post_commit_hooks
        }
        _ => a == b,
    }
}

/// Registry descriptor for the `scm-poll` kind, polling through `probe`.
pub fn scm_poll_descriptor(probe: Arc<dyn ScmProbe>) -> TriggerDescriptor {
    TriggerDescriptor::new(
        SCM_POLL_KIND,
        Box::new(scm_poll_equality),
        Box::new(move |ctx: ConstructionContext| -> Result<Arc<dyn Trigger>, TriggerError> {
            Ok(Arc::new(ScmPollTrigger::from_context(ctx, probe.clone())?))
        }),
    )
}

/// State shared between the trigger handle and its polling task.
struct Poller {
    job: JobId,
    instance: InstanceId,
    probe: Arc<dyn ScmProbe>,
    publisher: Option<Arc<dyn EventPublisher>>,
    baseline: Mutex<Option<String>>,
    polls: AtomicU64,
}

impl Poller {
    async fn poll(&self) -> Result<Option<FireCause>, TriggerError> {
        self.polls.fetch_add(1, Ordering::Relaxed);
        let Some(revision) = self.probe.latest_revision(&self.job).await? else {
            return Ok(None);
        };

        let cause = {
            let mut baseline = self.baseline.lock();
            match baseline.clone() {
                None => {
                    debug!(job = %self.job, %revision, "Recorded polling baseline");
                    *baseline = Some(revision);
                    None
                }
                Some(current) if current == revision => None,
                Some(current) => {
                    *baseline = Some(revision.clone());
                    Some(FireCause::ScmChange {
                        previous: Some(current),
                        revision,
                    })
                }
            }
        };

        if let Some(cause) = &cause {
            info!(job = %self.job, instance = %self.instance, "Repository changed");
            if let Some(publisher) = &self.publisher {
                publisher
                    .publish(TriggerEvent::TriggerFired {
                        job: self.job.to_string(),
                        kind: SCM_POLL_KIND.to_string(),
                        instance: self.instance.as_uuid(),
                        cause: cause.clone(),
                    })
                    .await;
            }
        }
        Ok(cause)
    }
}

/// Repository poller for one job.
pub struct ScmPollTrigger {
    schedule: Schedule,
    config: ScmPollConfig,
    poller: Arc<Poller>,
    task: TaskSlot,
}

impl ScmPollTrigger {
    pub fn from_context(
        ctx: ConstructionContext,
        probe: Arc<dyn ScmProbe>,
    ) -> Result<Self, TriggerError> {
        let config = ScmPollConfig::from_payload(ctx.spec.config())?;
        let schedule = Schedule::parse(&config.spec, ctx.job.as_str())
            .map_err(|e| TriggerError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            schedule,
            config,
            poller: Arc::new(Poller {
                job: ctx.job,
                instance: ctx.instance,
                probe,
                publisher: ctx.publisher,
                baseline: Mutex::new(None),
                polls: AtomicU64::new(0),
            }),
            task: TaskSlot::default(),
        })
    }

    #[must_use]
    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    #[must_use]
    pub fn config(&self) -> &ScmPollConfig {
        &self.config
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.task.is_active()
    }

    #[must_use]
    pub fn poll_count(&self) -> u64 {
        self.poller.polls.load(Ordering::Relaxed)
    }

    /// Last revision seen, if any poll succeeded.
    #[must_use]
    pub fn baseline(&self) -> Option<String> {
        self.poller.baseline.lock().clone()
    }

    /// Poll once outside the schedule. Returns the fire cause if the
    /// revision moved.
    pub async fn poll_now(&self) -> Result<Option<FireCause>, TriggerError> {
        self.poller.poll().await
    }
}

#[async_trait]
impl Trigger for ScmPollTrigger {
    async fn activate(&self) -> Result<(), TriggerError> {
        let started = self.task.start(|| {
            let poller = self.poller.clone();
            spawn_schedule(self.schedule.clone(), move |_| {
                let poller = poller.clone();
                async move {
                    if let Err(e) = poller.poll().await {
                        warn!(job = %poller.job, error = %e, "Polling failed");
                    }
                }
            })
        });

        if !started {
            return Err(TriggerError::Activation("poller already active".into()));
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
    use crate::ports::outbound::mocks::ScriptedProbe;
    use serde_json::json;
    use trigger_bus::{EventFilter, EventTopic, InMemoryEventBus};

    fn poller(
        config: ConfigPayload,
        revisions: Vec<Result<Option<String>, TriggerError>>,
        publisher: Option<Arc<dyn EventPublisher>>,
    ) -> ScmPollTrigger {
        let ctx = ConstructionContext {
            job: JobId::from("app"),
            instance: InstanceId::new(),
            spec: TriggerSpec::new(SCM_POLL_KIND, config),
            publisher,
        };
        ScmPollTrigger::from_context(ctx, Arc::new(ScriptedProbe::new(revisions))).unwrap()
    }

    fn rev(r: &str) -> Result<Option<String>, TriggerError> {
        Ok(Some(r.to_string()))
    }

    #[test]
    fn test_payload_forms() {
        let plain = ScmPollConfig::from_payload(&json!("H/5 * * * *")).unwrap();
        assert!(!plain.ignore_post_commit_hooks);

        let payload = json!({"spec": "@hourly", "ignore_post_commit_hooks": true});
        let full = ScmPollConfig::from_payload(&payload).unwrap();
        assert_eq!(full.spec, "@hourly");
        assert!(full.ignore_post_commit_hooks);

        assert!(ScmPollConfig::from_payload(&json!({"ignore_post_commit_hooks": true})).is_err());
        assert!(ScmPollConfig::from_payload(&json!([1])).is_err());
    }

    #[test]
    fn test_equality_includes_hook_flag() {
        assert!(scm_poll_equality(&json!("@hourly"), &json!({"spec": " @hourly "})));
        assert!(!scm_poll_equality(
            &json!("@hourly"),
            &json!({"spec": "@hourly", "ignore_post_commit_hooks": true})
        ));
    }

    #[tokio::test]
    async fn test_first_poll_records_baseline_without_firing() {
        let trigger = poller(json!("@hourly"), vec![rev("a1")], None);
        assert_eq!(trigger.poll_now().await.unwrap(), None);
        assert_eq!(trigger.baseline().as_deref(), Some("a1"));
    }

    #[tokio::test]
    async fn test_fires_when_revision_moves() {
        let bus = Arc::new(InMemoryEventBus::new());
        let mut sub = bus.subscribe(EventFilter::topics(vec![EventTopic::Fire]));
        let trigger = poller(
            json!("@hourly"),
            vec![rev("a1"), rev("a1"), rev("b2")],
            Some(bus.clone()),
        );

        assert_eq!(trigger.poll_now().await.unwrap(), None);
        assert_eq!(trigger.poll_now().await.unwrap(), None);
        let cause = trigger.poll_now().await.unwrap().unwrap();
        assert_eq!(
            cause,
            FireCause::ScmChange {
                previous: Some("a1".into()),
                revision: "b2".into(),
            }
        );

        let event = sub.try_recv().unwrap().unwrap();
        assert!(matches!(
            event,
            TriggerEvent::TriggerFired { ref kind, .. } if kind == SCM_POLL_KIND
        ));
        assert_eq!(trigger.poll_count(), 3);
    }

    #[tokio::test]
    async fn test_hook_flag_does_not_change_polling() {
        let trigger = poller(
            json!({"spec": "@hourly", "ignore_post_commit_hooks": true}),
            vec![rev("a1"), rev("b2")],
            None,
        );
        assert!(trigger.config().ignore_post_commit_hooks);
        assert_eq!(trigger.poll_now().await.unwrap(), None);
        assert_eq!(
            trigger.poll_now().await.unwrap(),
            Some(FireCause::ScmChange {
                previous: Some("a1".into()),
                revision: "b2".into(),
            })
        );
    }

    #[tokio::test]
    async fn test_probe_error_keeps_baseline() {
        let trigger = poller(
            json!("@hourly"),
            vec![rev("a1"), Err(TriggerError::Probe("unreachable".into())), rev("a1")],
            None,
        );
        trigger.poll_now().await.unwrap();
        assert!(trigger.poll_now().await.is_err());
        assert_eq!(trigger.poll_now().await.unwrap(), None);
        assert_eq!(trigger.baseline().as_deref(), Some("a1"));
    }

    #[tokio::test]
    async fn test_empty_repository_does_not_fire() {
        let trigger = poller(json!("@hourly"), vec![Ok(None)], None);
        assert_eq!(trigger.poll_now().await.unwrap(), None);
        assert_eq!(trigger.baseline(), None);
    }

    #[tokio::test]
    async fn test_activate_and_deactivate() {
        let trigger = poller(json!("@daily"), vec![], None);
        trigger.activate().await.unwrap();
        assert!(trigger.is_active());
        assert!(trigger.activate().await.is_err());
        trigger.deactivate().await.unwrap();
        tokio::task::yield_now().await;
        assert!(!trigger.is_active());
    }
}
