//! Value objects for trigger reconciliation

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque, comparable trigger configuration (a cron string, a poll schedule...).
pub type ConfigPayload = serde_json::Value;

/// Identifier of the job that owns a trigger container.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Names a class of trigger, e.g. `timer` or `scm-poll`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerKind(String);

impl TriggerKind {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TriggerKind {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TriggerKind {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A desired trigger: its kind plus configuration payload.
///
/// Immutable once constructed. Equality between specs of the same kind is
/// decided by the kind's registered equality function, not by `PartialEq`,
/// which is plain structural comparison.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TriggerSpec {
    kind: TriggerKind,
    config: ConfigPayload,
}

impl TriggerSpec {
    pub fn new(kind: impl Into<TriggerKind>, config: ConfigPayload) -> Self {
        Self {
            kind: kind.into(),
            config,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &TriggerKind {
        &self.kind
    }

    #[must_use]
    pub fn config(&self) -> &ConfigPayload {
        &self.config
    }
}

/// Identity of one trigger instance, distinct from its value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(Uuid);

impl InstanceId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle state of a trigger instance.
///
/// ```text
/// Stopped ──► Starting ──► Running ──► Stopping ──► Stopped
///                │                        ▲
///                ├── (activation failed) ─┼──► Stopped
///                └── (abandoned) ─────────┘
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl LifecycleState {
    /// Whether `self -> to` is a legal transition.
    #[must_use]
    pub fn can_transition_to(self, to: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, to),
            (Stopped, Starting)
                | (Starting, Running)
                | (Starting, Stopped)
                | (Starting, Stopping)
                | (Running, Stopping)
                | (Stopping, Stopped)
        )
    }

    /// Whether background work may be attached to an instance in this state.
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, LifecycleState::Starting | LifecycleState::Running)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Stopped => "stopped",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Who owns an instance's lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provenance {
    /// Created and owned by the reconciler.
    Managed,
    /// Injected by another mechanism; passed through untouched.
    External,
}
