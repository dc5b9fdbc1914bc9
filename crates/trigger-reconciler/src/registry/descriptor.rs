//! Trigger descriptors: how one kind is constructed and compared

use crate::domain::errors::TriggerError;
use crate::domain::value_objects::{ConfigPayload, InstanceId, JobId, TriggerKind, TriggerSpec};
use crate::ports::outbound::Trigger;
use std::fmt;
use std::sync::Arc;
use trigger_bus::EventPublisher;

/// Decides whether two payloads of the same kind describe the same trigger.
pub type EqualityFn = Box<dyn Fn(&ConfigPayload, &ConfigPayload) -> bool + Send + Sync>;

/// Builds the trigger implementation for one instance.
pub type TriggerConstructor =
    Box<dyn Fn(ConstructionContext) -> Result<Arc<dyn Trigger>, TriggerError> + Send + Sync>;

/// Everything a constructor gets to know about the instance it builds.
#[derive(Clone)]
pub struct ConstructionContext {
    pub job: JobId,
    pub instance: InstanceId,
    pub spec: TriggerSpec,
    /// Where the trigger should publish its fires, if anywhere.
    pub publisher: Option<Arc<dyn EventPublisher>>,
}

/// Metadata registered for one trigger kind.
pub struct TriggerDescriptor {
    kind: TriggerKind,
    equality: EqualityFn,
    constructor: TriggerConstructor,
}

impl TriggerDescriptor {
    pub fn new(
        kind: impl Into<TriggerKind>,
        equality: EqualityFn,
        constructor: TriggerConstructor,
    ) -> Self {
        Self {
            kind: kind.into(),
            equality,
            constructor,
        }
    }

    /// A descriptor comparing payloads by plain value equality.
    pub fn with_value_equality(
        kind: impl Into<TriggerKind>,
        constructor: TriggerConstructor,
    ) -> Self {
        Self::new(
            kind,
            Box::new(|a: &ConfigPayload, b: &ConfigPayload| a == b),
            constructor,
        )
    }

    #[must_use]
    pub fn kind(&self) -> &TriggerKind {
        &self.kind
    }

    #[must_use]
    pub fn equals(&self, a: &ConfigPayload, b: &ConfigPayload) -> bool {
        (self.equality)(a, b)
    }

    pub fn construct(&self, ctx: ConstructionContext) -> Result<Arc<dyn Trigger>, TriggerError> {
        (self.constructor)(ctx)
    }
}

impl fmt::Debug for TriggerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerDescriptor")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
