//! # Trigger Descriptor Registry
//!
//! Catalog of trigger kinds. Built once with [`RegistryBuilder`] and
//! immutable afterwards; lookups of unregistered kinds are errors.
//!
//! A process-wide instance can be installed with [`install_global`]. The
//! container manager is always handed its registry explicitly, so tests can
//! build private registries side by side.

mod descriptor;

pub use descriptor::{ConstructionContext, EqualityFn, TriggerConstructor, TriggerDescriptor};

use crate::domain::errors::{ReconcileError, RegistryError};
use crate::domain::value_objects::TriggerKind;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::info;

static GLOBAL: OnceLock<Arc<DescriptorRegistry>> = OnceLock::new();

/// Immutable kind -> descriptor catalog.
#[derive(Debug, Default)]
pub struct DescriptorRegistry {
    descriptors: HashMap<TriggerKind, Arc<TriggerDescriptor>>,
}

impl DescriptorRegistry {
    /// Start building a registry.
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Descriptor for `kind`, or `UnknownTriggerKind`.
    pub fn lookup(&self, kind: &TriggerKind) -> Result<Arc<TriggerDescriptor>, ReconcileError> {
        self.descriptors
            .get(kind)
            .cloned()
            .ok_or_else(|| ReconcileError::UnknownTriggerKind { kind: kind.clone() })
    }

    #[must_use]
    pub fn contains(&self, kind: &TriggerKind) -> bool {
        self.descriptors.contains_key(kind)
    }

    /// Registered kinds, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<TriggerKind> {
        let mut kinds: Vec<_> = self.descriptors.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Collects descriptors before the registry is frozen.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    descriptors: HashMap<TriggerKind, Arc<TriggerDescriptor>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a kind. Each kind may be registered once.
    pub fn register(&mut self, descriptor: TriggerDescriptor) -> Result<&mut Self, RegistryError> {
        let kind = descriptor.kind().clone();
        if self.descriptors.contains_key(&kind) {
            return Err(RegistryError::DuplicateKind(kind));
        }
        info!(kind = %kind, "[Registry] Registered trigger kind");
        self.descriptors.insert(kind, Arc::new(descriptor));
        Ok(self)
    }

    /// Freeze into an immutable registry.
    #[must_use]
    pub fn build(self) -> DescriptorRegistry {
        DescriptorRegistry {
            descriptors: self.descriptors,
        }
    }
}

/// Install the process-wide registry. Succeeds once per process.
pub fn install_global(
    registry: DescriptorRegistry,
) -> Result<Arc<DescriptorRegistry>, RegistryError> {
    let registry = Arc::new(registry);
    GLOBAL
        .set(registry.clone())
        .map_err(|_| RegistryError::AlreadyInstalled)?;
    info!(kinds = registry.len(), "[Registry] Installed global trigger registry");
    Ok(registry)
}

/// The process-wide registry, if installed.
#[must_use]
pub fn global() -> Option<Arc<DescriptorRegistry>> {
    GLOBAL.get().cloned()
}
