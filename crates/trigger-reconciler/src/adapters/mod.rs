//! Adapters module
//!
//! Concrete implementations of outbound ports and the built-in trigger kinds.

pub mod memory_store;
pub mod schedule;
pub mod scm_poll;
pub mod timer;

pub use memory_store::InMemoryContainerStore;
pub use schedule::{Schedule, ScheduleError};
pub use scm_poll::{scm_poll_descriptor, ScmPollTrigger, SCM_POLL_KIND};
pub use timer::{timer_descriptor, TimerTrigger, TIMER_KIND};

use crate::domain::errors::RegistryError;
use crate::ports::outbound::ScmProbe;
use crate::registry::RegistryBuilder;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Register `timer` and `scm-poll`.
pub fn register_builtin_kinds(
    builder: &mut RegistryBuilder,
    probe: Arc<dyn ScmProbe>,
) -> Result<(), RegistryError> {
    builder
        .register(timer_descriptor())?
        .register(scm_poll_descriptor(probe))?;
    Ok(())
}

/// Run `on_tick` at every scheduled minute until aborted or the schedule ends.
pub(crate) fn spawn_schedule<F, Fut>(schedule: Schedule, mut on_tick: F) -> JoinHandle<()>
where
    F: FnMut(DateTime<Utc>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let mut last: Option<DateTime<Utc>> = None;
        loop {
            let now = Utc::now();
            // Never fire the same minute twice, even if the wall clock lags.
            let base = last.map_or(now, |l| l.max(now));
            let Some(next) = schedule.next_after(base) else {
                debug!(schedule = %schedule.source(), "Schedule has no further occurrences");
                return;
            };
            let wait = (next - now).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;
            last = Some(next);
            on_tick(next).await;
        }
    })
}

/// Holds the background task of an active trigger.
#[derive(Default)]
pub(crate) struct TaskSlot {
    handle: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl TaskSlot {
    /// Install `spawn()`'s task unless one is already running.
    pub(crate) fn start(&self, spawn: impl FnOnce() -> JoinHandle<()>) -> bool {
        let mut handle = self.handle.lock();
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }
        *handle = Some(spawn());
        true
    }

    /// Abort the task, if any.
    pub(crate) fn stop(&self) {
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.handle.lock().as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for TaskSlot {
    fn drop(&mut self) {
        self.stop();
    }
}
