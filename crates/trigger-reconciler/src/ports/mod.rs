//! Ports module for trigger reconciliation
//!
//! Defines inbound (API) and outbound (SPI) port traits.

pub mod inbound;
pub mod outbound;

pub use inbound::TriggerReconciliationApi;
pub use outbound::{ContainerSnapshot, ContainerStore, ScmProbe, Trigger};
