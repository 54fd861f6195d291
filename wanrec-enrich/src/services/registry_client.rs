//! Internet registry (RDAP) client
//!
//! The transport only: one HTTP request per call, no retries, no rate
//! limiting. Both live in [`RegistryResolver`](super::registry_resolver::RegistryResolver)
//! so they are shared by every worker of a run.

use async_trait::async_trait;
use serde_json::Value;
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_RDAP_BASE_URL: &str = "https://rdap.arin.net/registry/ip/";

const USER_AGENT: &str = concat!("wanrec/", env!("CARGO_PKG_VERSION"));

/// Registry lookup failures; both are non-fatal and never cached
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// Network error, timeout, or non-2xx status
    #[error("Registry unavailable: {0}")]
    Unavailable(String),

    /// Response was not a usable RDAP document
    #[error("Malformed registry response: {0}")]
    MalformedResponse(String),
}

/// Source of RDAP documents for public addresses
#[async_trait]
pub trait RegistryClient: Send + Sync {
    async fn lookup(&self, ip: IpAddr) -> Result<Value, RegistryError>;
}

/// RDAP over HTTPS
pub struct RdapClient {
    client: reqwest::Client,
    base_url: String,
}

impl RdapClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RegistryError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| RegistryError::Unavailable(format!("HTTP client setup failed: {}", e)))?;

        let mut base_url = base_url.trim().to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self { client, base_url })
    }

    pub fn url_for(&self, ip: IpAddr) -> String {
        format!("{}{}", self.base_url, ip)
    }
}

#[async_trait]
impl RegistryClient for RdapClient {
    async fn lookup(&self, ip: IpAddr) -> Result<Value, RegistryError> {
        let url = self.url_for(ip);
        debug!(ip = %ip, url = %url, "Querying RDAP");

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/rdap+json, application/json")
            .send()
            .await
            .map_err(|e| RegistryError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Unavailable(format!("HTTP {} from {}", status, url)));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| RegistryError::MalformedResponse(e.to_string()))
    }
}
