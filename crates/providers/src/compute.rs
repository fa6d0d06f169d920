//! Compute provisioning client.
//!
//! Servers come back from `create` long before they are usable:
//! `addresses` stays empty until the provider finishes network setup,
//! so callers poll [`ComputeProvider::get_server`] for it.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::http::{check_status, parse_response};

const PROVIDER: &str = "compute";

/// Provider-owned server lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServerStatus {
    Build,
    Active,
    Error,
    Shutdown,
    /// Any status this client does not recognize.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Build => "BUILD",
            Self::Active => "ACTIVE",
            Self::Error => "ERROR",
            Self::Shutdown => "SHUTDOWN",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// A provisioned (or provisioning) compute server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    pub status: ServerStatus,
    /// Network name to assigned addresses. Empty until the provider
    /// finishes network setup.
    #[serde(default)]
    pub addresses: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

/// Everything the provider needs to boot a server.
#[derive(Debug, Clone, Serialize)]
pub struct CreateServerRequest {
    pub name: String,
    pub image_id: String,
    pub flavor_ref: String,
    /// Files injected into the guest image, path to contents.
    pub files: HashMap<String, String>,
    /// Device name to block-device mapping descriptor.
    pub block_device_mapping: HashMap<String, String>,
}

/// Capability interface for the compute provisioning service.
#[async_trait]
pub trait ComputeProvider: Send + Sync {
    /// Request a new server. Returns as soon as the provider accepts
    /// the request; the server builds asynchronously.
    async fn create_server(&self, request: &CreateServerRequest) -> Result<Server, ProviderError>;

    /// Fetch the current state of a server.
    async fn get_server(&self, id: &str) -> Result<Server, ProviderError>;

    /// Ask the host to rescan an attached volume after a resize.
    async fn rescan_volume(&self, server_id: &str, volume_id: &str) -> Result<(), ProviderError>;
}

/// HTTP client for the compute provisioning API.
pub struct HttpComputeProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpComputeProvider {
    /// * `base_url` - e.g. `http://compute.internal:8774`.
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    /// Reuse an existing [`reqwest::Client`] (connection pooling
    /// across providers).
    pub fn with_client(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl ComputeProvider for HttpComputeProvider {
    async fn create_server(&self, request: &CreateServerRequest) -> Result<Server, ProviderError> {
        let response = self
            .client
            .post(format!("{}/servers", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(|source| ProviderError::Request { provider: PROVIDER, source })?;

        parse_response(PROVIDER, response).await
    }

    async fn get_server(&self, id: &str) -> Result<Server, ProviderError> {
        let response = self
            .client
            .get(format!("{}/servers/{}", self.base_url, id))
            .send()
            .await
            .map_err(|source| ProviderError::Request { provider: PROVIDER, source })?;

        parse_response(PROVIDER, response).await
    }

    async fn rescan_volume(&self, server_id: &str, volume_id: &str) -> Result<(), ProviderError> {
        let body = serde_json::json!({ "volume_id": volume_id });
        let response = self
            .client
            .post(format!("{}/servers/{}/rescan-volume", self.base_url, server_id))
            .json(&body)
            .send()
            .await
            .map_err(|source| ProviderError::Request { provider: PROVIDER, source })?;

        check_status(PROVIDER, response).await
    }
}
