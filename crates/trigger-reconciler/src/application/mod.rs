//! Application layer
//!
//! - `lifecycle`: start/stop side effects on single instances
//! - `journal`: what a pass has actually done, committed even if it is cancelled
//! - `service`: the container manager tying registry, diff and lifecycle together

pub mod journal;
pub mod lifecycle;
pub mod service;

use std::sync::Arc;
use trigger_bus::{EventPublisher, TriggerEvent};

/// Optional event publisher plus the switch that enables it.
#[derive(Clone, Default)]
pub(crate) struct EventSink {
    publisher: Option<Arc<dyn EventPublisher>>,
    enabled: bool,
}

impl EventSink {
    pub(crate) fn new(publisher: Option<Arc<dyn EventPublisher>>, enabled: bool) -> Self {
        Self { publisher, enabled }
    }

    pub(crate) fn publisher(&self) -> Option<Arc<dyn EventPublisher>> {
        self.publisher.clone()
    }

    pub(crate) async fn emit(&self, event: TriggerEvent) {
        if !self.enabled {
            return;
        }
        if let Some(publisher) = &self.publisher {
            publisher.publish(event).await;
        }
    }
}
