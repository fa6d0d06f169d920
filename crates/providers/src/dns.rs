//! DNS registration client.

use async_trait::async_trait;
use serde::Deserialize;

use burrow_core::types::DbId;

use crate::error::ProviderError;
use crate::http::{check_status, parse_response};

const PROVIDER: &str = "dns";

/// Capability interface for the DNS registration service.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Register the instance's address under its hostname.
    async fn create_instance_entry(
        &self,
        instance_id: DbId,
        ip_address: &str,
    ) -> Result<(), ProviderError>;

    /// Ask the DNS service to assign a hostname for the instance.
    /// Returns the assigned name; the caller persists it.
    async fn update_hostname(&self, instance_id: DbId, name: &str)
        -> Result<String, ProviderError>;
}

/// HTTP client for the DNS API.
pub struct HttpDnsProvider {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct HostnameResponse {
    hostname: String,
}

impl HttpDnsProvider {
    /// * `base_url` - e.g. `http://dns.internal:9001`.
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
impl DnsProvider for HttpDnsProvider {
    async fn create_instance_entry(
        &self,
        instance_id: DbId,
        ip_address: &str,
    ) -> Result<(), ProviderError> {
        let body = serde_json::json!({
            "instance_id": instance_id,
            "ip_address": ip_address,
        });
        let response = self
            .client
            .post(format!("{}/entries", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|source| ProviderError::Request { provider: PROVIDER, source })?;

        check_status(PROVIDER, response).await
    }

    async fn update_hostname(
        &self,
        instance_id: DbId,
        name: &str,
    ) -> Result<String, ProviderError> {
        let body = serde_json::json!({ "name": name });
        let response = self
            .client
            .put(format!("{}/hostnames/{}", self.base_url, instance_id))
            .json(&body)
            .send()
            .await
            .map_err(|source| ProviderError::Request { provider: PROVIDER, source })?;

        let parsed: HostnameResponse = parse_response(PROVIDER, response).await?;
        Ok(parsed.hostname)
    }
}
