//! Postgres-backed [`InstanceStore`].
//!
//! Schema ownership lives with the control plane that creates instance
//! records; this store only reads and updates them. Expected tables:
//! `instances` (BIGINT id, TEXT name/hostname/compute_instance_id/
//! volume_id, SMALLINT status ids, TIMESTAMPTZ created_at/updated_at)
//! and `service_statuses` (BIGINT instance_id, SMALLINT status_id,
//! TIMESTAMPTZ updated_at).

use async_trait::async_trait;
use sqlx::PgPool;

use burrow_core::types::{DbId, Timestamp};

use crate::models::{
    Instance, InstanceStatus, InstanceTaskStatus, ServiceStatus, StatusId,
};
use crate::store::{InstanceStore, StoreError};

/// Column list for `instances` queries.
const INSTANCE_COLUMNS: &str = "\
    id, name, hostname, status_id, task_status_id, \
    compute_instance_id, volume_id, created_at, updated_at";

/// Postgres persistence for instance records.
pub struct PgInstanceStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct InstanceRow {
    id: DbId,
    name: String,
    hostname: Option<String>,
    status_id: StatusId,
    task_status_id: StatusId,
    compute_instance_id: Option<String>,
    volume_id: Option<String>,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl InstanceRow {
    fn into_instance(self) -> Result<Instance, StoreError> {
        let status = InstanceStatus::from_id(self.status_id).ok_or_else(|| {
            StoreError::Database(format!("instance {}: unknown status id {}", self.id, self.status_id))
        })?;
        let task_status = InstanceTaskStatus::from_id(self.task_status_id).ok_or_else(|| {
            StoreError::Database(format!(
                "instance {}: unknown task status id {}",
                self.id, self.task_status_id
            ))
        })?;

        Ok(Instance {
            id: self.id,
            name: self.name,
            hostname: self.hostname,
            status,
            task_status,
            compute_instance_id: self.compute_instance_id,
            volume_id: self.volume_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl PgInstanceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InstanceStore for PgInstanceStore {
    async fn find_by(&self, id: DbId) -> Result<Instance, StoreError> {
        let query = format!("SELECT {INSTANCE_COLUMNS} FROM instances WHERE id = $1");
        let row = sqlx::query_as::<_, InstanceRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        row.ok_or(StoreError::NotFound(id))?.into_instance()
    }

    async fn save(&self, instance: &Instance) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE instances SET \
                name = $2, hostname = $3, status_id = $4, task_status_id = $5, \
                compute_instance_id = $6, volume_id = $7, updated_at = now() \
             WHERE id = $1",
        )
        .bind(instance.id)
        .bind(&instance.name)
        .bind(instance.hostname.as_deref())
        .bind(instance.status.id())
        .bind(instance.task_status.id())
        .bind(instance.compute_instance_id.as_deref())
        .bind(instance.volume_id.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(instance.id));
        }
        Ok(())
    }

    async fn create_service_status(&self, status: &ServiceStatus) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO service_statuses (instance_id, status_id, updated_at) \
             VALUES ($1, $2, $3)",
        )
        .bind(status.instance_id)
        .bind(status.status.id())
        .bind(status.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }
}
