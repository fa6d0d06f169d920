//! Client for the in-guest configuration agent.
//!
//! Guests are not reachable over HTTP; each one consumes its own
//! routing key (`guest.{instance_id}`) on the message transport.
//! `prepare` is a cast — the guest reports readiness out of band
//! through its service status record — while `resize_fs` is a call,
//! because the resize workflow needs to know the filesystem grew.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use burrow_core::transport::{TaskEnvelope, Transport};
use burrow_core::types::DbId;
use burrow_core::RequestContext;

use crate::error::ProviderError;

/// A database schema the guest should create on first boot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSpec {
    pub name: String,
    #[serde(default)]
    pub character_set: Option<String>,
    #[serde(default)]
    pub collate: Option<String>,
}

/// Initialization payload for a freshly booted guest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestPrepare {
    /// Memory budget for the database service, in megabytes.
    pub memory_mb: u32,
    pub databases: Vec<DatabaseSpec>,
    pub users: Vec<String>,
    /// Block device the guest should format and mount.
    pub device_path: String,
    pub mount_point: String,
}

/// Capability interface for the guest agent.
#[async_trait]
pub trait GuestClient: Send + Sync {
    /// Tell a guest to initialize its database service.
    async fn prepare(
        &self,
        ctx: &RequestContext,
        instance_id: DbId,
        request: &GuestPrepare,
    ) -> Result<(), ProviderError>;

    /// Tell a guest to grow its filesystem to fill the (resized)
    /// underlying volume.
    async fn resize_fs(
        &self,
        ctx: &RequestContext,
        instance_id: DbId,
        mount_point: &str,
    ) -> Result<(), ProviderError>;
}

/// Guest client speaking over the message transport.
pub struct RpcGuestClient {
    transport: Arc<dyn Transport>,
}

impl RpcGuestClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    fn routing_key(instance_id: DbId) -> String {
        format!("guest.{instance_id}")
    }
}

#[async_trait]
impl GuestClient for RpcGuestClient {
    async fn prepare(
        &self,
        ctx: &RequestContext,
        instance_id: DbId,
        request: &GuestPrepare,
    ) -> Result<(), ProviderError> {
        let args = serde_json::to_value(request)
            .map_err(|e| ProviderError::Guest(e.to_string()))?;
        let envelope = TaskEnvelope {
            method: "prepare".to_string(),
            args,
        };

        tracing::debug!(
            request_id = %ctx.request_id,
            instance_id,
            memory_mb = request.memory_mb,
            "sending prepare to guest",
        );
        self.transport
            .cast(ctx, &Self::routing_key(instance_id), envelope)
            .await
            .map_err(|e| ProviderError::Guest(e.to_string()))
    }

    async fn resize_fs(
        &self,
        ctx: &RequestContext,
        instance_id: DbId,
        mount_point: &str,
    ) -> Result<(), ProviderError> {
        let envelope = TaskEnvelope {
            method: "resize_fs".to_string(),
            args: serde_json::json!({ "mount_point": mount_point }),
        };

        self.transport
            .call(ctx, &Self::routing_key(instance_id), envelope)
            .await
            .map(|_| ())
            .map_err(|e| ProviderError::Guest(e.to_string()))
    }
}
