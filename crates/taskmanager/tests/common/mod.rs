//! Shared test harness: scripted fake providers, an in-memory store,
//! and a tiny-interval configuration so polling workflows finish in
//! milliseconds.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use burrow_core::types::DbId;
use burrow_core::RequestContext;
use burrow_providers::compute::{ComputeProvider, CreateServerRequest, Server, ServerStatus};
use burrow_providers::dns::DnsProvider;
use burrow_providers::guest::{GuestClient, GuestPrepare};
use burrow_providers::volume::{Volume, VolumeProvider, VolumeStatus};
use burrow_providers::ProviderError;
use burrow_store::{Instance, InstanceStore, MemoryInstanceStore};
use burrow_taskmanager::{InstanceTasks, TaskConfig};

/// Config with millisecond-scale polling and DNS enabled.
pub fn test_config() -> TaskConfig {
    TaskConfig {
        volume_poll_interval: Duration::from_millis(2),
        resize_poll_interval: Duration::from_millis(2),
        volume_poll_timeout: Duration::from_millis(40),
        address_poll_interval: Duration::from_millis(2),
        address_poll_timeout: Duration::from_millis(40),
        heartbeat_interval: Duration::from_millis(50),
        dns_enabled: true,
        ..TaskConfig::default()
    }
}

pub fn ctx() -> RequestContext {
    RequestContext::new()
}

/// Seed an instance record and return a copy of it.
pub fn seed_instance(store: &MemoryInstanceStore, id: DbId) -> Instance {
    let instance = Instance::new(id, format!("db-{id}"));
    store.insert(instance.clone());
    instance
}

fn injected_failure(provider: &'static str) -> ProviderError {
    ProviderError::Api {
        provider,
        status: 500,
        body: "injected failure".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Fake block-storage provider
// ---------------------------------------------------------------------------

/// Scripted block-storage fake. `get_volume` walks the status script;
/// the last entry repeats once exhausted, and an empty script means
/// the volume stays `creating` forever.
pub struct FakeVolumeProvider {
    statuses: Mutex<VecDeque<VolumeStatus>>,
    created_size: Mutex<i64>,
    pub create_calls: AtomicUsize,
    pub get_calls: AtomicUsize,
    pub resize_calls: Mutex<Vec<(String, i64)>>,
    pub fail_create: AtomicBool,
    pub fail_get: AtomicBool,
    pub fail_resize: AtomicBool,
}

impl FakeVolumeProvider {
    pub fn with_statuses(statuses: impl IntoIterator<Item = VolumeStatus>) -> Arc<Self> {
        Arc::new(Self {
            statuses: Mutex::new(statuses.into_iter().collect()),
            created_size: Mutex::new(1),
            create_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
            resize_calls: Mutex::new(Vec::new()),
            fail_create: AtomicBool::new(false),
            fail_get: AtomicBool::new(false),
            fail_resize: AtomicBool::new(false),
        })
    }

    pub fn resize_calls(&self) -> Vec<(String, i64)> {
        self.resize_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl VolumeProvider for FakeVolumeProvider {
    async fn create_volume(
        &self,
        size_gb: i64,
        _display_name: &str,
        _display_description: &str,
    ) -> Result<Volume, ProviderError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(injected_failure("block-storage"));
        }
        *self.created_size.lock().unwrap() = size_gb;
        Ok(Volume {
            id: "vol-1".to_string(),
            size: size_gb,
            status: VolumeStatus::Creating,
            attachments: Vec::new(),
            availability_zone: None,
        })
    }

    async fn get_volume(&self, id: &str) -> Result<Volume, ProviderError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(injected_failure("block-storage"));
        }
        let status = {
            let mut script = self.statuses.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script.front().copied().unwrap_or(VolumeStatus::Creating)
            }
        };
        Ok(Volume {
            id: id.to_string(),
            size: *self.created_size.lock().unwrap(),
            status,
            attachments: Vec::new(),
            availability_zone: None,
        })
    }

    async fn resize_volume(&self, id: &str, new_size_gb: i64) -> Result<(), ProviderError> {
        if self.fail_resize.load(Ordering::SeqCst) {
            return Err(injected_failure("block-storage"));
        }
        self.resize_calls
            .lock()
            .unwrap()
            .push((id.to_string(), new_size_gb));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fake compute provider
// ---------------------------------------------------------------------------

type ServerState = (HashMap<String, Vec<String>>, ServerStatus);

/// Scripted compute fake. `get_server` walks (addresses, status)
/// states; the last entry repeats once exhausted.
pub struct FakeComputeProvider {
    states: Mutex<VecDeque<ServerState>>,
    pub create_calls: AtomicUsize,
    pub rescan_calls: Mutex<Vec<(String, String)>>,
    pub last_create: Mutex<Option<CreateServerRequest>>,
    pub fail_create: AtomicBool,
}

impl FakeComputeProvider {
    /// A server whose public address is assigned on the first poll.
    pub fn ready() -> Arc<Self> {
        Self::with_states([(
            HashMap::from([("public".to_string(), vec!["10.0.0.5".to_string()])]),
            ServerStatus::Active,
        )])
    }

    pub fn with_states(states: impl IntoIterator<Item = ServerState>) -> Arc<Self> {
        Arc::new(Self {
            states: Mutex::new(states.into_iter().collect()),
            create_calls: AtomicUsize::new(0),
            rescan_calls: Mutex::new(Vec::new()),
            last_create: Mutex::new(None),
            fail_create: AtomicBool::new(false),
        })
    }

    pub fn rescan_calls(&self) -> Vec<(String, String)> {
        self.rescan_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ComputeProvider for FakeComputeProvider {
    async fn create_server(&self, request: &CreateServerRequest) -> Result<Server, ProviderError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(injected_failure("compute"));
        }
        *self.last_create.lock().unwrap() = Some(request.clone());
        Ok(Server {
            id: "srv-1".to_string(),
            status: ServerStatus::Build,
            addresses: HashMap::new(),
            host: None,
            tenant_id: None,
        })
    }

    async fn get_server(&self, id: &str) -> Result<Server, ProviderError> {
        let (addresses, status) = {
            let mut script = self.states.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script
                    .front()
                    .cloned()
                    .unwrap_or((HashMap::new(), ServerStatus::Build))
            }
        };
        Ok(Server {
            id: id.to_string(),
            status,
            addresses,
            host: None,
            tenant_id: None,
        })
    }

    async fn rescan_volume(&self, server_id: &str, volume_id: &str) -> Result<(), ProviderError> {
        self.rescan_calls
            .lock()
            .unwrap()
            .push((server_id.to_string(), volume_id.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fake DNS provider
// ---------------------------------------------------------------------------

pub struct FakeDnsProvider {
    pub entries: Mutex<Vec<(DbId, String)>>,
    pub hostname_calls: AtomicUsize,
}

impl FakeDnsProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(Vec::new()),
            hostname_calls: AtomicUsize::new(0),
        })
    }

    pub fn entries(&self) -> Vec<(DbId, String)> {
        self.entries.lock().unwrap().clone()
    }

    /// Total provider calls of any kind, for "no calls happened" tests.
    pub fn total_calls(&self) -> usize {
        self.entries.lock().unwrap().len() + self.hostname_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DnsProvider for FakeDnsProvider {
    async fn create_instance_entry(
        &self,
        instance_id: DbId,
        ip_address: &str,
    ) -> Result<(), ProviderError> {
        self.entries
            .lock()
            .unwrap()
            .push((instance_id, ip_address.to_string()));
        Ok(())
    }

    async fn update_hostname(
        &self,
        _instance_id: DbId,
        name: &str,
    ) -> Result<String, ProviderError> {
        self.hostname_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{name}.db.example.net"))
    }
}

// ---------------------------------------------------------------------------
// Fake guest client
// ---------------------------------------------------------------------------

pub struct FakeGuestClient {
    pub prepares: Mutex<Vec<(DbId, GuestPrepare)>>,
    pub resizes: Mutex<Vec<(DbId, String)>>,
    pub fail_resize_fs: AtomicBool,
}

impl FakeGuestClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            prepares: Mutex::new(Vec::new()),
            resizes: Mutex::new(Vec::new()),
            fail_resize_fs: AtomicBool::new(false),
        })
    }

    pub fn prepares(&self) -> Vec<(DbId, GuestPrepare)> {
        self.prepares.lock().unwrap().clone()
    }

    pub fn resizes(&self) -> Vec<(DbId, String)> {
        self.resizes.lock().unwrap().clone()
    }
}

#[async_trait]
impl GuestClient for FakeGuestClient {
    async fn prepare(
        &self,
        _ctx: &RequestContext,
        instance_id: DbId,
        request: &GuestPrepare,
    ) -> Result<(), ProviderError> {
        self.prepares
            .lock()
            .unwrap()
            .push((instance_id, request.clone()));
        Ok(())
    }

    async fn resize_fs(
        &self,
        _ctx: &RequestContext,
        instance_id: DbId,
        mount_point: &str,
    ) -> Result<(), ProviderError> {
        if self.fail_resize_fs.load(Ordering::SeqCst) {
            return Err(ProviderError::Guest("injected failure".to_string()));
        }
        self.resizes
            .lock()
            .unwrap()
            .push((instance_id, mount_point.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// All the collaborators behind one [`InstanceTasks`], kept as their
/// concrete fakes so tests can script and inspect them.
pub struct Harness {
    pub store: Arc<MemoryInstanceStore>,
    pub compute: Arc<FakeComputeProvider>,
    pub volumes: Arc<FakeVolumeProvider>,
    pub dns: Arc<FakeDnsProvider>,
    pub guest: Arc<FakeGuestClient>,
}

impl Harness {
    /// Happy-path defaults: volume available on first poll, server
    /// addressed on first poll.
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryInstanceStore::new()),
            compute: FakeComputeProvider::ready(),
            volumes: FakeVolumeProvider::with_statuses([VolumeStatus::Available]),
            dns: FakeDnsProvider::new(),
            guest: FakeGuestClient::new(),
        }
    }

    pub fn tasks(&self, config: TaskConfig) -> InstanceTasks {
        InstanceTasks::new(
            Arc::clone(&self.store) as Arc<dyn InstanceStore>,
            Arc::clone(&self.compute) as Arc<dyn ComputeProvider>,
            Arc::clone(&self.volumes) as Arc<dyn VolumeProvider>,
            Arc::clone(&self.dns) as Arc<dyn DnsProvider>,
            Arc::clone(&self.guest) as Arc<dyn GuestClient>,
            config,
        )
    }
}
