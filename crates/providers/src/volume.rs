//! Block-storage client.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::http::{check_status, parse_response};

const PROVIDER: &str = "block-storage";

/// Provider-owned volume status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeStatus {
    Creating,
    Available,
    #[serde(rename = "in-use")]
    InUse,
    Deleting,
    Error,
    /// Any status this client does not recognize.
    #[serde(other)]
    Unknown,
}

impl VolumeStatus {
    /// Whether a freshly created volume has finished building,
    /// successfully or not.
    pub fn is_create_terminal(self) -> bool {
        matches!(self, Self::Available | Self::Error)
    }
}

impl fmt::Display for VolumeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Creating => "creating",
            Self::Available => "available",
            Self::InUse => "in-use",
            Self::Deleting => "deleting",
            Self::Error => "error",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// An attachment of a volume to a server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeAttachment {
    pub server_id: String,
    #[serde(default)]
    pub device: Option<String>,
}

/// A block-storage volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    pub id: String,
    /// Size in gigabytes.
    pub size: i64,
    pub status: VolumeStatus,
    #[serde(default)]
    pub attachments: Vec<VolumeAttachment>,
    #[serde(default)]
    pub availability_zone: Option<String>,
}

/// Capability interface for the block-storage service.
#[async_trait]
pub trait VolumeProvider: Send + Sync {
    /// Request a new volume. Returns as soon as the provider accepts;
    /// the volume stays `creating` until built.
    async fn create_volume(
        &self,
        size_gb: i64,
        display_name: &str,
        display_description: &str,
    ) -> Result<Volume, ProviderError>;

    /// Fetch the current state of a volume.
    async fn get_volume(&self, id: &str) -> Result<Volume, ProviderError>;

    /// Request a capacity change for an attached volume.
    async fn resize_volume(&self, id: &str, new_size_gb: i64) -> Result<(), ProviderError>;
}

/// HTTP client for the block-storage API.
pub struct HttpVolumeProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpVolumeProvider {
    /// * `base_url` - e.g. `http://volumes.internal:8776`.
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    /// Reuse an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl VolumeProvider for HttpVolumeProvider {
    async fn create_volume(
        &self,
        size_gb: i64,
        display_name: &str,
        display_description: &str,
    ) -> Result<Volume, ProviderError> {
        let body = serde_json::json!({
            "size": size_gb,
            "display_name": display_name,
            "display_description": display_description,
        });
        let response = self
            .client
            .post(format!("{}/volumes", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|source| ProviderError::Request { provider: PROVIDER, source })?;

        parse_response(PROVIDER, response).await
    }

    async fn get_volume(&self, id: &str) -> Result<Volume, ProviderError> {
        let response = self
            .client
            .get(format!("{}/volumes/{}", self.base_url, id))
            .send()
            .await
            .map_err(|source| ProviderError::Request { provider: PROVIDER, source })?;

        parse_response(PROVIDER, response).await
    }

    async fn resize_volume(&self, id: &str, new_size_gb: i64) -> Result<(), ProviderError> {
        let body = serde_json::json!({ "new_size": new_size_gb });
        let response = self
            .client
            .post(format!("{}/volumes/{}/resize", self.base_url, id))
            .json(&body)
            .send()
            .await
            .map_err(|source| ProviderError::Request { provider: PROVIDER, source })?;

        check_status(PROVIDER, response).await
    }
}
