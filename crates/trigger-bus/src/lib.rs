//! # Trigger Bus - Event Bus for Trigger Lifecycle Notifications
//!
//! Carries everything observable about running triggers to whoever cares:
//! lifecycle transitions driven by the reconciler, container commits, and
//! the fires emitted by the triggers themselves.
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │  Reconciler  │                    │   Runtime    │
//! │   Triggers   │    publish()       │  Admin/Logs  │
//! │              │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │  Event Bus   │          │
//!                  │              │ ─────────┘
//!                  └──────────────┘  subscribe()
//! ```
//!
//! Delivery is best effort: a publish with no subscribers is dropped, and a
//! subscriber that falls behind by more than the channel capacity skips the
//! oldest events.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod events;
pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use events::{EventFilter, EventTopic, FireCause, TriggerEvent};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::{EventStream, EventSubscriber, Subscription, SubscriptionError};

/// Maximum events to buffer per subscriber before the oldest are dropped.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacity() {
        assert_eq!(DEFAULT_CHANNEL_CAPACITY, 1024);
    }
}
