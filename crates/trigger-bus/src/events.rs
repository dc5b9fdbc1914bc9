//! # Trigger Events
//!
//! Defines all event types that flow through the trigger bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a trigger fired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FireCause {
    /// A scheduled minute was reached.
    Schedule {
        /// The minute the schedule matched.
        scheduled_for: DateTime<Utc>,
    },
    /// Polling observed a new source revision.
    ScmChange {
        /// Revision seen before the change, if any.
        previous: Option<String>,
        /// Newly observed revision.
        revision: String,
    },
}

/// All events that can be published to the trigger bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerEvent {
    // =========================================================================
    // LIFECYCLE
    // =========================================================================
    /// A managed trigger instance finished activation and is running.
    TriggerStarted {
        job: String,
        kind: String,
        instance: Uuid,
    },

    /// A managed trigger instance was deactivated.
    TriggerStopped {
        job: String,
        kind: String,
        instance: Uuid,
    },

    /// Construction or activation of a desired trigger failed.
    /// The trigger is omitted from the committed container.
    ActivationFailed {
        job: String,
        kind: String,
        reason: String,
    },

    /// Deactivation failed. The instance is removed regardless; whatever
    /// background work it owned may have leaked.
    DeactivationFailed {
        job: String,
        kind: String,
        instance: Uuid,
        reason: String,
    },

    // =========================================================================
    // CONTAINER
    // =========================================================================
    /// A reconciliation pass committed a non-empty container.
    ContainerCommitted {
        job: String,
        managed: usize,
        external: usize,
    },

    /// A reconciliation pass left no triggers and the container was removed.
    ContainerRemoved { job: String },

    // =========================================================================
    // FIRE
    // =========================================================================
    /// A running trigger decided downstream work should be scheduled.
    TriggerFired {
        job: String,
        kind: String,
        instance: Uuid,
        cause: FireCause,
    },
}

impl TriggerEvent {
    /// Get the topic for this event.
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::TriggerStarted { .. }
            | Self::TriggerStopped { .. }
            | Self::ActivationFailed { .. }
            | Self::DeactivationFailed { .. } => EventTopic::Lifecycle,
            Self::ContainerCommitted { .. } | Self::ContainerRemoved { .. } => {
                EventTopic::Container
            }
            Self::TriggerFired { .. } => EventTopic::Fire,
        }
    }

    /// Get the job this event concerns.
    #[must_use]
    pub fn job(&self) -> &str {
        match self {
            Self::TriggerStarted { job, .. }
            | Self::TriggerStopped { job, .. }
            | Self::ActivationFailed { job, .. }
            | Self::DeactivationFailed { job, .. }
            | Self::ContainerCommitted { job, .. }
            | Self::ContainerRemoved { job }
            | Self::TriggerFired { job, .. } => job,
        }
    }
}

/// Event topics for filtering subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// Start/stop outcomes of individual instances.
    Lifecycle,
    /// Container commits and removals.
    Container,
    /// Trigger fires.
    Fire,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
    /// Jobs to include. Empty means all jobs.
    pub jobs: Vec<String>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self {
            topics,
            jobs: Vec::new(),
        }
    }

    /// Create a filter for events about specific jobs.
    #[must_use]
    pub fn for_jobs(jobs: Vec<String>) -> Self {
        Self {
            topics: Vec::new(),
            jobs,
        }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &TriggerEvent) -> bool {
        let topic_match = self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic());

        let job_match = self.jobs.is_empty() || self.jobs.iter().any(|j| j == event.job());

        topic_match && job_match
    }
}
