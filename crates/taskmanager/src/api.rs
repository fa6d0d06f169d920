//! Client facade for submitting work to the task manager.
//!
//! Callers outside the worker process use [`TaskApi`] instead of
//! touching the engine: one method per workflow, submitted over the
//! transport as a call (synchronous) or a cast (fire-and-forget).
//!
//! Error policy: a failure reported by the task manager itself passes
//! through unchanged as [`ApiError::Task`]; every failure of the
//! messaging layer — timeout, unroutable key, dead consumer,
//! serialization — is logged and collapsed into the single opaque
//! [`ApiError::OrchestrationUnavailable`], so callers never match on
//! transport internals.

use std::sync::Arc;

use burrow_core::transport::{RemoteError, Transport, TransportError};
use burrow_core::types::DbId;
use burrow_core::RequestContext;

use crate::ops::{
    CreateDnsEntryArgs, CreateInstanceArgs, CreateVolumeArgs, ResizeVolumeArgs, TaskCall,
};
use crate::tasks::VolumeInfo;

/// Routing key of the task manager's inbound queue.
pub const ROUTING_KEY: &str = "taskmanager";

/// Errors surfaced to facade callers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The messaging layer failed before the task manager answered.
    #[error("task orchestration unavailable: {0}")]
    OrchestrationUnavailable(String),

    /// The task manager ran the operation and it failed.
    #[error(transparent)]
    Task(#[from] RemoteError),
}

/// Handle for one caller's submissions to the task manager.
pub struct TaskApi {
    transport: Arc<dyn Transport>,
    context: RequestContext,
}

impl TaskApi {
    pub fn new(transport: Arc<dyn Transport>, context: RequestContext) -> Self {
        Self { transport, context }
    }

    /// Kick off full instance provisioning. Fire-and-forget.
    pub async fn create_instance(&self, args: CreateInstanceArgs) -> Result<(), ApiError> {
        self.cast(TaskCall::CreateInstance(args)).await
    }

    /// Create a data volume and wait for the resulting descriptor.
    pub async fn create_volume(
        &self,
        instance_id: DbId,
        volume_size: i64,
    ) -> Result<VolumeInfo, ApiError> {
        let value = self
            .call(TaskCall::CreateVolume(CreateVolumeArgs {
                instance_id,
                volume_size,
            }))
            .await?;
        serde_json::from_value(value).map_err(|e| {
            ApiError::OrchestrationUnavailable(format!("malformed create_volume result: {e}"))
        })
    }

    /// Register a DNS entry for a provisioned server. Fire-and-forget.
    pub async fn create_dns_entry(
        &self,
        server_id: impl Into<String>,
        instance_id: DbId,
    ) -> Result<(), ApiError> {
        self.cast(TaskCall::CreateDnsEntry(CreateDnsEntryArgs {
            server_id: server_id.into(),
            instance_id,
        }))
        .await
    }

    /// Grow an instance's data volume. Fire-and-forget.
    pub async fn resize_volume(&self, instance_id: DbId, new_size: i64) -> Result<(), ApiError> {
        self.cast(TaskCall::ResizeVolume(ResizeVolumeArgs {
            instance_id,
            new_size,
        }))
        .await
    }

    // ---- private helpers ----

    async fn call(&self, call: TaskCall) -> Result<serde_json::Value, ApiError> {
        let method = call.method();
        tracing::debug!(request_id = %self.context.request_id, method, "calling task manager");

        let envelope = call
            .into_envelope()
            .map_err(|e| ApiError::OrchestrationUnavailable(e.to_string()))?;

        match self.transport.call(&self.context, ROUTING_KEY, envelope).await {
            Ok(value) => Ok(value),
            Err(TransportError::Remote(remote)) => Err(ApiError::Task(remote)),
            Err(error) => {
                tracing::error!(
                    request_id = %self.context.request_id,
                    method,
                    error = %error,
                    "task manager call failed",
                );
                Err(ApiError::OrchestrationUnavailable(error.to_string()))
            }
        }
    }

    async fn cast(&self, call: TaskCall) -> Result<(), ApiError> {
        let method = call.method();
        tracing::debug!(request_id = %self.context.request_id, method, "casting to task manager");

        let envelope = call
            .into_envelope()
            .map_err(|e| ApiError::OrchestrationUnavailable(e.to_string()))?;

        self.transport
            .cast(&self.context, ROUTING_KEY, envelope)
            .await
            .map_err(|error| {
                tracing::error!(
                    request_id = %self.context.request_id,
                    method,
                    error = %error,
                    "task manager cast failed",
                );
                ApiError::OrchestrationUnavailable(error.to_string())
            })
    }
}
