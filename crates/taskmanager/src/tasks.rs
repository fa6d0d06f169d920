//! Instance provisioning workflows.
//!
//! Each workflow is an ordered sequence of provider calls with
//! poll-until waits wherever a provider completes asynchronously.
//! Failures are reported, never rolled back: a failed run leaves the
//! instance in whatever partial state the last successful step
//! produced, with its task status reset so it is never stuck.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use burrow_core::poll::{poll_until, PollError};
use burrow_core::types::DbId;
use burrow_core::RequestContext;
use burrow_providers::compute::{ComputeProvider, CreateServerRequest, Server, ServerStatus};
use burrow_providers::dns::DnsProvider;
use burrow_providers::guest::{DatabaseSpec, GuestClient, GuestPrepare};
use burrow_providers::volume::{Volume, VolumeProvider, VolumeStatus};
use burrow_providers::ProviderError;
use burrow_store::{Instance, InstanceStore, InstanceTaskStatus, ServiceStatus, StoreError};

use crate::config::TaskConfig;
use crate::ops::CreateInstanceArgs;

/// Memory budget handed to every freshly prepared guest, in megabytes.
const GUEST_MEMORY_MB: u32 = 512;

/// Identity file injected into new guest images.
const GUEST_INFO_PATH: &str = "/etc/guest_info";

/// Errors from the workflow engine.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// No instance record exists for the id.
    #[error("instance {0} not found")]
    NotFound(DbId),

    /// A bounded wait ran out of patience.
    #[error("timed out waiting for {what} after {waited:?}")]
    PollTimeout {
        what: &'static str,
        waited: Duration,
    },

    /// The block-storage service built the volume into an error state.
    #[error("volume {volume_id} entered status {status} during provisioning")]
    VolumeCreationFailure {
        volume_id: String,
        status: VolumeStatus,
    },

    /// The compute server failed before an address was assigned.
    #[error("server {server_id} reached status {status} before an address was assigned")]
    ServerFailed {
        server_id: String,
        status: ServerStatus,
    },

    /// The operation needs a volume the instance does not have.
    #[error("instance {0} has no volume attached")]
    VolumeMissing(DbId),

    /// The operation needs a compute server the instance does not have.
    #[error("instance {0} has no compute server")]
    ServerMissing(DbId),

    /// A provider call failed; passed through unclassified.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The persistence layer failed.
    #[error(transparent)]
    Store(StoreError),
}

impl TaskError {
    /// Stable machine-readable tag carried over the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NotFound",
            Self::PollTimeout { .. } => "PollTimeout",
            Self::VolumeCreationFailure { .. } => "VolumeCreationFailure",
            Self::ServerFailed { .. } => "ServerError",
            Self::VolumeMissing(_) | Self::ServerMissing(_) => "InvalidState",
            Self::Provider(_) => "ProviderError",
            Self::Store(_) => "StorageError",
        }
    }
}

impl From<StoreError> for TaskError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Store(other),
        }
    }
}

/// One volume in a [`VolumeInfo`] descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeRef {
    pub id: String,
    /// Size in gigabytes.
    pub size: i64,
}

/// Everything downstream steps need to know about a created volume:
/// the mapping handed to the compute create call, and the device path
/// and mount point handed to the guest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeInfo {
    pub block_device_mapping: HashMap<String, String>,
    pub device_path: String,
    pub mount_point: String,
    pub volumes: Vec<VolumeRef>,
}

/// The workflow engine: one instance of this drives every provisioning
/// task the dispatcher receives.
pub struct InstanceTasks {
    store: Arc<dyn InstanceStore>,
    compute: Arc<dyn ComputeProvider>,
    volumes: Arc<dyn VolumeProvider>,
    dns: Arc<dyn DnsProvider>,
    guest: Arc<dyn GuestClient>,
    config: TaskConfig,
}

impl InstanceTasks {
    pub fn new(
        store: Arc<dyn InstanceStore>,
        compute: Arc<dyn ComputeProvider>,
        volumes: Arc<dyn VolumeProvider>,
        dns: Arc<dyn DnsProvider>,
        guest: Arc<dyn GuestClient>,
        config: TaskConfig,
    ) -> Self {
        Self {
            store,
            compute,
            volumes,
            dns,
            guest,
            config,
        }
    }

    /// Provision a full instance: volume, server, DNS entry, guest.
    ///
    /// A missing instance record aborts immediately. Any step failure
    /// after that is logged and swallowed; partially created resources
    /// stay in place. The task status returns to `None` on every exit.
    pub async fn create_instance(
        &self,
        ctx: &RequestContext,
        args: CreateInstanceArgs,
    ) -> Result<(), TaskError> {
        tracing::info!(
            request_id = %ctx.request_id,
            instance_id = args.instance_id,
            name = %args.name,
            "provisioning instance",
        );

        let mut instance = self.store.find_by(args.instance_id).await?;
        instance.task_status = InstanceTaskStatus::Building;
        self.store.save(&instance).await?;

        if let Err(error) = self.provision(ctx, &args).await {
            tracing::error!(
                request_id = %ctx.request_id,
                instance_id = args.instance_id,
                error = %error,
                "instance provisioning failed",
            );
        }

        // Reload before the final write: the steps persist volume and
        // server ids on the record as they complete.
        let mut instance = self.store.find_by(args.instance_id).await?;
        instance.task_status = InstanceTaskStatus::None;
        self.store.save(&instance).await?;
        Ok(())
    }

    /// The ordered provisioning steps; aborts at the first failure.
    async fn provision(
        &self,
        ctx: &RequestContext,
        args: &CreateInstanceArgs,
    ) -> Result<(), TaskError> {
        let volume_info = self
            .create_volume(ctx, args.instance_id, args.volume_size)
            .await?;
        let server = self.create_server(ctx, args, &volume_info).await?;
        self.create_dns_entry(ctx, args.instance_id, &server.id).await?;
        self.guest_prepare(ctx, args.instance_id, &server, &volume_info, &args.databases)
            .await?;

        tracing::info!(
            request_id = %ctx.request_id,
            instance_id = args.instance_id,
            server_id = %server.id,
            "instance provisioning complete",
        );
        Ok(())
    }

    /// Create the instance's data volume and wait for it to build.
    ///
    /// The volume id is persisted on the instance record as soon as the
    /// provider acknowledges creation, before the first poll, so a
    /// crash mid-wait still leaves a recoverable trail.
    pub async fn create_volume(
        &self,
        ctx: &RequestContext,
        instance_id: DbId,
        volume_size: i64,
    ) -> Result<VolumeInfo, TaskError> {
        tracing::info!(
            request_id = %ctx.request_id,
            instance_id,
            volume_size,
            "creating volume",
        );

        let mut instance = self.store.find_by(instance_id).await?;

        let display_name = format!("mysql-{instance_id}");
        let description = format!("mysql volume for instance {instance_id}");
        let volume = self
            .volumes
            .create_volume(volume_size, &display_name, &description)
            .await?;

        instance.volume_id = Some(volume.id.clone());
        self.store.save(&instance).await?;

        let volume = self
            .wait_for_volume(
                &volume.id,
                self.config.volume_poll_interval,
                |v| v.status.is_create_terminal(),
                "volume creation",
            )
            .await?;
        if volume.status == VolumeStatus::Error {
            return Err(TaskError::VolumeCreationFailure {
                volume_id: volume.id,
                status: volume.status,
            });
        }

        tracing::debug!(
            request_id = %ctx.request_id,
            volume_id = %volume.id,
            size = volume.size,
            "volume is available",
        );
        Ok(self.volume_info(&volume))
    }

    /// Register a DNS entry for a provisioned server.
    ///
    /// Gated on the DNS support flag: when disabled this returns
    /// without touching any provider. Otherwise it waits (bounded) for
    /// the server's address map to fill in, records the assigned
    /// hostname, and registers the first address.
    pub async fn create_dns_entry(
        &self,
        ctx: &RequestContext,
        instance_id: DbId,
        server_id: &str,
    ) -> Result<(), TaskError> {
        if !self.config.dns_enabled {
            tracing::debug!(
                request_id = %ctx.request_id,
                instance_id,
                "DNS support disabled; skipping entry",
            );
            return Ok(());
        }

        let server = self.wait_for_address(server_id).await?;
        let ip_address = first_address(&server.addresses).ok_or(TaskError::ServerFailed {
            server_id: server.id.clone(),
            status: server.status,
        })?;

        let mut instance = self.store.find_by(instance_id).await?;
        let hostname = self.dns.update_hostname(instance.id, &instance.name).await?;
        instance.hostname = Some(hostname);
        self.store.save(&instance).await?;

        self.dns.create_instance_entry(instance_id, &ip_address).await?;
        tracing::info!(
            request_id = %ctx.request_id,
            instance_id,
            ip_address = %ip_address,
            "registered dns entry",
        );
        Ok(())
    }

    /// Grow an instance's data volume and its guest filesystem.
    ///
    /// Inner failures (including poll timeouts) are logged, never
    /// re-raised: for every outcome the instance's task status is
    /// `None` when this returns, so the record can never stay stuck in
    /// `Resizing`.
    pub async fn resize_volume(
        &self,
        ctx: &RequestContext,
        instance_id: DbId,
        new_size: i64,
    ) -> Result<(), TaskError> {
        tracing::info!(
            request_id = %ctx.request_id,
            instance_id,
            new_size,
            "resizing volume",
        );

        let mut instance = self.store.find_by(instance_id).await?;
        instance.task_status = InstanceTaskStatus::Resizing;
        self.store.save(&instance).await?;

        match self.grow_volume(ctx, &instance, new_size).await {
            Ok(()) => tracing::info!(
                request_id = %ctx.request_id,
                instance_id,
                "volume resize complete",
            ),
            Err(TaskError::PollTimeout { waited, .. }) => tracing::error!(
                request_id = %ctx.request_id,
                instance_id,
                ?waited,
                "timed out waiting for the resized volume to attach",
            ),
            Err(error) => tracing::error!(
                request_id = %ctx.request_id,
                instance_id,
                error = %error,
                "volume resize failed",
            ),
        }

        instance.task_status = InstanceTaskStatus::None;
        self.store.save(&instance).await?;
        Ok(())
    }

    // ---- private steps ----

    /// Request a compute server carrying the guest identity file and
    /// the block-device mapping for the data volume.
    async fn create_server(
        &self,
        ctx: &RequestContext,
        args: &CreateInstanceArgs,
        volume_info: &VolumeInfo,
    ) -> Result<Server, TaskError> {
        let guest_info = format!(
            "guest_id={}\nservice_type={}\n",
            args.instance_id, args.service_type
        );
        let request = CreateServerRequest {
            name: args.name.clone(),
            image_id: args.image_id.clone(),
            flavor_ref: args.flavor_ref.clone(),
            files: HashMap::from([(GUEST_INFO_PATH.to_string(), guest_info)]),
            block_device_mapping: volume_info.block_device_mapping.clone(),
        };

        let server = self.compute.create_server(&request).await?;
        tracing::info!(
            request_id = %ctx.request_id,
            instance_id = args.instance_id,
            server_id = %server.id,
            "requested compute server",
        );
        Ok(server)
    }

    /// Record the server on the instance, create the initial guest
    /// service status, and tell the guest to initialize.
    async fn guest_prepare(
        &self,
        ctx: &RequestContext,
        instance_id: DbId,
        server: &Server,
        volume_info: &VolumeInfo,
        databases: &[DatabaseSpec],
    ) -> Result<(), TaskError> {
        let mut instance = self.store.find_by(instance_id).await?;
        instance.compute_instance_id = Some(server.id.clone());
        self.store.save(&instance).await?;

        self.store
            .create_service_status(&ServiceStatus::new(instance_id))
            .await?;

        let request = GuestPrepare {
            memory_mb: GUEST_MEMORY_MB,
            databases: databases.to_vec(),
            users: Vec::new(),
            device_path: volume_info.device_path.clone(),
            mount_point: volume_info.mount_point.clone(),
        };
        self.guest.prepare(ctx, instance_id, &request).await?;

        tracing::info!(
            request_id = %ctx.request_id,
            instance_id,
            server_id = %server.id,
            "guest prepare dispatched",
        );
        Ok(())
    }

    /// The inner resize sequence; aborts at the first failure.
    async fn grow_volume(
        &self,
        ctx: &RequestContext,
        instance: &Instance,
        new_size: i64,
    ) -> Result<(), TaskError> {
        let volume_id = instance
            .volume_id
            .clone()
            .ok_or(TaskError::VolumeMissing(instance.id))?;
        let server_id = instance
            .compute_instance_id
            .clone()
            .ok_or(TaskError::ServerMissing(instance.id))?;

        self.volumes.resize_volume(&volume_id, new_size).await?;
        self.wait_for_volume(
            &volume_id,
            self.config.resize_poll_interval,
            |v| v.status == VolumeStatus::InUse,
            "volume resize",
        )
        .await?;
        self.compute.rescan_volume(&server_id, &volume_id).await?;
        self.guest
            .resize_fs(ctx, instance.id, &self.config.mount_point)
            .await?;
        Ok(())
    }

    // ---- waits and helpers ----

    /// Poll a volume until `done` holds, bounded by the volume poll
    /// timeout.
    async fn wait_for_volume<F>(
        &self,
        volume_id: &str,
        interval: Duration,
        mut done: F,
        what: &'static str,
    ) -> Result<Volume, TaskError>
    where
        F: FnMut(&Volume) -> bool,
    {
        poll_until(
            || {
                let volumes = Arc::clone(&self.volumes);
                let id = volume_id.to_string();
                async move { volumes.get_volume(&id).await.map_err(TaskError::from) }
            },
            |volume| {
                if done(volume) {
                    return Ok(true);
                }
                tracing::debug!(volume_id = %volume.id, status = %volume.status, "waiting for volume");
                Ok(false)
            },
            interval,
            self.config.volume_poll_timeout,
        )
        .await
        .map_err(|e| flatten_poll(e, what))
    }

    /// Poll a server until its address map is non-empty, bounded by
    /// the address poll timeout. A server that goes to `ERROR` while
    /// still unaddressed fails the wait immediately.
    async fn wait_for_address(&self, server_id: &str) -> Result<Server, TaskError> {
        poll_until(
            || {
                let compute = Arc::clone(&self.compute);
                let id = server_id.to_string();
                async move { compute.get_server(&id).await.map_err(TaskError::from) }
            },
            |server: &Server| {
                if !server.addresses.is_empty() {
                    return Ok(true);
                }
                if server.status == ServerStatus::Error {
                    return Err(TaskError::ServerFailed {
                        server_id: server.id.clone(),
                        status: server.status,
                    });
                }
                tracing::debug!(server_id = %server.id, status = %server.status, "waiting for address assignment");
                Ok(false)
            },
            self.config.address_poll_interval,
            self.config.address_poll_timeout,
        )
        .await
        .map_err(|e| flatten_poll(e, "server address assignment"))
    }

    /// Assemble the descriptor handed to the compute create call and
    /// later to the guest.
    fn volume_info(&self, volume: &Volume) -> VolumeInfo {
        // Mapping format: <id>:<type>:<size GB>:<delete_on_terminate>,
        // with delete-on-terminate set.
        let mapping = format!("{}::{}:1", volume.id, volume.size);
        let block_device_mapping =
            HashMap::from([(self.config.block_device_mapping.clone(), mapping)]);

        VolumeInfo {
            block_device_mapping,
            device_path: self.config.device_path.clone(),
            mount_point: self.config.mount_point.clone(),
            volumes: vec![VolumeRef {
                id: volume.id.clone(),
                size: volume.size,
            }],
        }
    }
}

/// Pick the address to publish: the first address of the first
/// network, in network-name order.
fn first_address(addresses: &HashMap<String, Vec<String>>) -> Option<String> {
    let mut networks: Vec<&String> = addresses.keys().collect();
    networks.sort();
    networks
        .into_iter()
        .find_map(|network| addresses[network].first().cloned())
}

fn flatten_poll(error: PollError<TaskError>, what: &'static str) -> TaskError {
    match error {
        PollError::Timeout { waited } => TaskError::PollTimeout { what, waited },
        PollError::Probe(error) => error,
    }
}

#[cfg(test)]
mod tests {
    use super::first_address;
    use std::collections::HashMap;

    #[test]
    fn first_address_prefers_sorted_network_order() {
        let addresses = HashMap::from([
            ("private".to_string(), vec!["192.168.0.3".to_string()]),
            ("public".to_string(), vec!["10.0.0.5".to_string()]),
        ]);
        assert_eq!(first_address(&addresses).as_deref(), Some("192.168.0.3"));
    }

    #[test]
    fn first_address_skips_empty_networks() {
        let addresses = HashMap::from([
            ("private".to_string(), Vec::new()),
            ("public".to_string(), vec!["10.0.0.5".to_string()]),
        ]);
        assert_eq!(first_address(&addresses).as_deref(), Some("10.0.0.5"));
    }

    #[test]
    fn first_address_of_empty_map_is_none() {
        assert_eq!(first_address(&HashMap::new()), None);
    }
}
