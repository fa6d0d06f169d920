//! Persisted records for the Burrow provisioning service.
//!
//! The workflow engine owns one [`Instance`] record per provisioning
//! run and mutates it at the exact points where a provider call
//! succeeds. This crate provides the record types, their status
//! enums, and the [`InstanceStore`] seam with a Postgres and an
//! in-memory backend.

pub mod models;
pub mod pg;
pub mod store;

pub use models::{
    Instance, InstanceStatus, InstanceTaskStatus, ServiceStatus, ServiceStatusKind,
};
pub use pg::PgInstanceStore;
pub use store::{InstanceStore, MemoryInstanceStore, StoreError};
