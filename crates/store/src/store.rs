//! The instance persistence seam.
//!
//! Workflows load, mutate, and save exactly one [`Instance`] record per
//! run; the store is the single source of truth between steps
//! (last-writer-wins, no record-level locking).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use burrow_core::types::DbId;

use crate::models::{Instance, ServiceStatus};

/// Errors from the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No instance record exists for the id.
    #[error("instance {0} not found")]
    NotFound(DbId),

    /// The underlying database failed.
    #[error("storage error: {0}")]
    Database(String),
}

/// Persistence operations the workflow engine needs.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Load an instance record by id.
    async fn find_by(&self, id: DbId) -> Result<Instance, StoreError>;

    /// Write the record back. Fails with [`StoreError::NotFound`] if
    /// the record has disappeared.
    async fn save(&self, instance: &Instance) -> Result<(), StoreError>;

    /// Record a fresh guest service status for an instance.
    async fn create_service_status(&self, status: &ServiceStatus) -> Result<(), StoreError>;
}

/// In-memory store for tests and single-process deployments.
pub struct MemoryInstanceStore {
    instances: Mutex<HashMap<DbId, Instance>>,
    service_statuses: Mutex<Vec<ServiceStatus>>,
}

impl MemoryInstanceStore {
    pub fn new() -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
            service_statuses: Mutex::new(Vec::new()),
        }
    }

    /// Seed a record, bypassing the `save` existence check.
    pub fn insert(&self, instance: Instance) {
        self.instances
            .lock()
            .expect("instance table poisoned")
            .insert(instance.id, instance);
    }

    /// Snapshot of every service status recorded so far.
    pub fn service_statuses(&self) -> Vec<ServiceStatus> {
        self.service_statuses
            .lock()
            .expect("service status table poisoned")
            .clone()
    }
}

impl Default for MemoryInstanceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InstanceStore for MemoryInstanceStore {
    async fn find_by(&self, id: DbId) -> Result<Instance, StoreError> {
        self.instances
            .lock()
            .expect("instance table poisoned")
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn save(&self, instance: &Instance) -> Result<(), StoreError> {
        let mut instances = self.instances.lock().expect("instance table poisoned");
        if !instances.contains_key(&instance.id) {
            return Err(StoreError::NotFound(instance.id));
        }
        let mut record = instance.clone();
        record.updated_at = chrono::Utc::now();
        instances.insert(record.id, record);
        Ok(())
    }

    async fn create_service_status(&self, status: &ServiceStatus) -> Result<(), StoreError> {
        self.service_statuses
            .lock()
            .expect("service status table poisoned")
            .push(status.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InstanceTaskStatus;

    #[tokio::test]
    async fn find_by_returns_seeded_record() {
        let store = MemoryInstanceStore::new();
        store.insert(Instance::new(1, "prod-db"));

        let instance = store.find_by(1).await.expect("record was seeded");
        assert_eq!(instance.name, "prod-db");
    }

    #[tokio::test]
    async fn find_by_missing_record_is_not_found() {
        let store = MemoryInstanceStore::new();
        let result = store.find_by(42).await;
        assert!(matches!(result, Err(StoreError::NotFound(42))));
    }

    #[tokio::test]
    async fn save_round_trips_mutations() {
        let store = MemoryInstanceStore::new();
        store.insert(Instance::new(1, "prod-db"));

        let mut instance = store.find_by(1).await.unwrap();
        instance.volume_id = Some("vol-9".to_string());
        instance.task_status = InstanceTaskStatus::Building;
        store.save(&instance).await.expect("record exists");

        let reloaded = store.find_by(1).await.unwrap();
        assert_eq!(reloaded.volume_id.as_deref(), Some("vol-9"));
        assert_eq!(reloaded.task_status, InstanceTaskStatus::Building);
    }

    #[tokio::test]
    async fn save_of_unknown_record_is_not_found() {
        let store = MemoryInstanceStore::new();
        let result = store.save(&Instance::new(5, "ghost")).await;
        assert!(matches!(result, Err(StoreError::NotFound(5))));
    }

    #[tokio::test]
    async fn service_statuses_accumulate() {
        let store = MemoryInstanceStore::new();
        store
            .create_service_status(&ServiceStatus::new(1))
            .await
            .unwrap();
        store
            .create_service_status(&ServiceStatus::new(2))
            .await
            .unwrap();

        let statuses = store.service_statuses();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].instance_id, 1);
        assert_eq!(statuses[1].instance_id, 2);
    }
}
