//! Task manager configuration loaded from environment variables.

use std::time::Duration;

/// Tunables for the workflow engine and dispatcher.
///
/// All fields have defaults suitable for local development. In
/// production, override via environment variables.
#[derive(Debug, Clone)]
pub struct TaskConfig {
    /// Sleep between volume status probes during creation.
    pub volume_poll_interval: Duration,
    /// Sleep between volume status probes during a resize.
    pub resize_poll_interval: Duration,
    /// Total patience for a volume status change.
    pub volume_poll_timeout: Duration,
    /// Sleep between server address probes.
    pub address_poll_interval: Duration,
    /// Total patience for a server address assignment.
    pub address_poll_timeout: Duration,
    /// How often the dispatcher reports its in-flight count.
    pub heartbeat_interval: Duration,
    /// How long a synchronous submission waits for the dispatcher's
    /// reply before the transport gives up.
    pub call_timeout: Duration,
    /// Device name key for the block-device mapping.
    pub block_device_mapping: String,
    /// Device path the guest sees for its data volume.
    pub device_path: String,
    /// Mount point of the database data directory inside the guest.
    pub mount_point: String,
    /// Whether to register DNS entries for new instances.
    pub dns_enabled: bool,
    /// Compute provisioning API base URL.
    pub compute_url: String,
    /// Block-storage API base URL.
    pub volume_url: String,
    /// DNS API base URL.
    pub dns_url: String,
}

impl TaskConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                  |
    /// |------------------------------|--------------------------|
    /// | `VOLUME_POLL_INTERVAL_SECS`  | `1`                      |
    /// | `RESIZE_POLL_INTERVAL_SECS`  | `2`                      |
    /// | `VOLUME_POLL_TIMEOUT_SECS`   | `180`                    |
    /// | `ADDRESS_POLL_INTERVAL_SECS` | `1`                      |
    /// | `ADDRESS_POLL_TIMEOUT_SECS`  | `120`                    |
    /// | `HEARTBEAT_INTERVAL_SECS`    | `30`                     |
    /// | `CALL_TIMEOUT_SECS`          | `30`                     |
    /// | `BLOCK_DEVICE_MAPPING`       | `vdb`                    |
    /// | `DEVICE_PATH`                | `/dev/vdb`               |
    /// | `MOUNT_POINT`                | `/var/lib/mysql`         |
    /// | `DNS_ENABLED`                | `false`                  |
    /// | `COMPUTE_API_URL`            | `http://localhost:8774`  |
    /// | `VOLUME_API_URL`             | `http://localhost:8776`  |
    /// | `DNS_API_URL`                | `http://localhost:9001`  |
    pub fn from_env() -> Self {
        Self {
            volume_poll_interval: secs_from_env("VOLUME_POLL_INTERVAL_SECS", 1),
            resize_poll_interval: secs_from_env("RESIZE_POLL_INTERVAL_SECS", 2),
            volume_poll_timeout: secs_from_env("VOLUME_POLL_TIMEOUT_SECS", 180),
            address_poll_interval: secs_from_env("ADDRESS_POLL_INTERVAL_SECS", 1),
            address_poll_timeout: secs_from_env("ADDRESS_POLL_TIMEOUT_SECS", 120),
            heartbeat_interval: secs_from_env("HEARTBEAT_INTERVAL_SECS", 30),
            call_timeout: secs_from_env("CALL_TIMEOUT_SECS", 30),
            block_device_mapping: string_from_env("BLOCK_DEVICE_MAPPING", "vdb"),
            device_path: string_from_env("DEVICE_PATH", "/dev/vdb"),
            mount_point: string_from_env("MOUNT_POINT", "/var/lib/mysql"),
            dns_enabled: bool_from_env("DNS_ENABLED"),
            compute_url: string_from_env("COMPUTE_API_URL", "http://localhost:8774"),
            volume_url: string_from_env("VOLUME_API_URL", "http://localhost:8776"),
            dns_url: string_from_env("DNS_API_URL", "http://localhost:9001"),
        }
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            volume_poll_interval: Duration::from_secs(1),
            resize_poll_interval: Duration::from_secs(2),
            volume_poll_timeout: Duration::from_secs(180),
            address_poll_interval: Duration::from_secs(1),
            address_poll_timeout: Duration::from_secs(120),
            heartbeat_interval: Duration::from_secs(30),
            call_timeout: Duration::from_secs(30),
            block_device_mapping: "vdb".to_string(),
            device_path: "/dev/vdb".to_string(),
            mount_point: "/var/lib/mysql".to_string(),
            dns_enabled: false,
            compute_url: "http://localhost:8774".to_string(),
            volume_url: "http://localhost:8776".to_string(),
            dns_url: "http://localhost:9001".to_string(),
        }
    }
}

fn secs_from_env(name: &str, default: u64) -> Duration {
    let secs: u64 = std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .unwrap_or_else(|_| panic!("{name} must be a whole number of seconds"));
    Duration::from_secs(secs)
}

fn string_from_env(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn bool_from_env(name: &str) -> bool {
    std::env::var(name)
        .map(|v| {
            let v = v.trim();
            v.eq_ignore_ascii_case("true") || v == "1"
        })
        .unwrap_or(false)
}
