//! Fire listener: logs every `TriggerFired` and counts it per kind.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use trigger_bus::{EventFilter, EventTopic, FireCause, InMemoryEventBus, TriggerEvent};
use trigger_telemetry::{log_job_event, TRIGGER_FIRES};

/// Spawn the listener. It exits when the bus closes or `shutdown` flips.
pub fn spawn_fire_listener(
    bus: &InMemoryEventBus,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let mut subscription = bus.subscribe(EventFilter::topics(vec![EventTopic::Fire]));

    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = subscription.recv() => match event {
                    Some(event) => record_fire(&event),
                    None => {
                        debug!("Event bus closed");
                        break;
                    }
                },
                _ = shutdown.changed() => break,
            }
        }
        info!("Fire listener stopped");
    })
}

fn record_fire(event: &TriggerEvent) {
    let TriggerEvent::TriggerFired {
        job,
        kind,
        instance,
        cause,
    } = event
    else {
        return;
    };

    TRIGGER_FIRES.with_label_values(&[kind.as_str()]).inc();
    match cause {
        FireCause::Schedule { scheduled_for } => {
            log_job_event!(
                info,
                job,
                "Trigger fired",
                kind = %kind,
                instance = %instance,
                scheduled_for = %scheduled_for
            );
        }
        FireCause::ScmChange { previous, revision } => {
            log_job_event!(
                info,
                job,
                "Trigger fired",
                kind = %kind,
                instance = %instance,
                previous = ?previous,
                revision = %revision
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;
    use trigger_bus::EventPublisher;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_fires_are_counted_per_kind() {
        let bus = InMemoryEventBus::new();
        let (tx, rx) = watch::channel(false);
        let handle = spawn_fire_listener(&bus, rx);

        let kind = "fires-test-kind";
        let before = TRIGGER_FIRES.with_label_values(&[kind]).get();
        bus.publish(TriggerEvent::TriggerFired {
            job: "nightly".into(),
            kind: kind.into(),
            instance: Uuid::new_v4(),
            cause: FireCause::Schedule {
                scheduled_for: Utc::now(),
            },
        })
        .await;
        bus.publish(TriggerEvent::ContainerRemoved {
            job: "nightly".into(),
        })
        .await;

        tokio::time::timeout(Duration::from_secs(5), async {
            while TRIGGER_FIRES.with_label_values(&[kind]).get() == before {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        tx.send(true).unwrap();
        handle.await.unwrap();
        assert_eq!(TRIGGER_FIRES.with_label_values(&[kind]).get(), before + 1);
    }
}
