//! IPFS Kubo content store
//!
//! Talks to a Kubo node over its RPC API (`/api/v0/*`, every command is a
//! POST). Chunking, DAG encoding and the bitswap exchange all happen inside
//! the Kubo daemon; this adapter only maps its replies onto registry errors.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use sdk::{ContentId, RegistryError, Result};
use serde::Deserialize;
use std::time::Duration;

use super::ContentStore;

/// Content store backed by a Kubo RPC endpoint
#[derive(Debug, Clone)]
pub struct KuboContentStore {
    /// Base URL of the RPC API (typically http://127.0.0.1:5001)
    base_url: String,

    /// Bound for pin and fetch, which may need to reach other peers
    fetch_timeout: Duration,

    /// HTTP client for RPC requests
    client: Client,
}

/// Reply to `add`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AddResponse {
    hash: String,
}

/// Error body Kubo sends with non-2xx replies
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KuboErrorBody {
    message: String,
}

impl KuboContentStore {
    /// Create a new Kubo content store
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the Kubo RPC API
    /// * `fetch_timeout` - Upper bound for pin and fetch
    pub fn new(base_url: impl Into<String>, fetch_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("spacecore-registry/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RegistryError::Store(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            fetch_timeout,
            client,
        })
    }

    fn endpoint(&self, command: &str) -> String {
        format!("{}/api/v0/{}", self.base_url, command)
    }

    fn transport_error(&self, command: &str, err: reqwest::Error) -> RegistryError {
        if err.is_connect() {
            RegistryError::Store(format!(
                "Cannot connect to IPFS at {}. Is the daemon running?",
                self.base_url
            ))
        } else {
            RegistryError::Store(format!("IPFS {} request failed: {}", command, err))
        }
    }
}

/// Extract Kubo's error message from a failed reply
async fn error_message(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<KuboErrorBody>(&body) {
        Ok(parsed) => parsed.message,
        Err(_) if body.trim().is_empty() => format!("HTTP {}", status),
        Err(_) => body.trim().to_string(),
    }
}

#[async_trait]
impl ContentStore for KuboContentStore {
    fn name(&self) -> &str {
        "kubo"
    }

    async fn add(&self, bytes: Vec<u8>) -> Result<ContentId> {
        let size = bytes.len();
        let form = Form::new().part("file", Part::bytes(bytes).file_name("plugin"));

        let response = self
            .client
            .post(self.endpoint("add"))
            .query(&[("cid-version", "1"), ("pin", "false"), ("quieter", "true")])
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.transport_error("add", e))?;

        if !response.status().is_success() {
            let message = error_message(response).await;
            return Err(RegistryError::Store(format!("IPFS add failed: {}", message)));
        }

        let added: AddResponse = response
            .json()
            .await
            .map_err(|e| RegistryError::Store(format!("Unexpected IPFS add reply: {}", e)))?;

        tracing::debug!("IPFS add: {} bytes -> {}", size, added.hash);
        Ok(ContentId::new(added.hash))
    }

    async fn pin(&self, id: &ContentId) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint("pin/add"))
            .query(&[("arg", id.as_str())])
            .timeout(self.fetch_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RegistryError::pin(id.as_str(), "content could not be located in time")
                } else {
                    self.transport_error("pin/add", e)
                }
            })?;

        if !response.status().is_success() {
            let message = error_message(response).await;
            return Err(RegistryError::pin(id.as_str(), message));
        }

        Ok(())
    }

    async fn unpin(&self, id: &ContentId) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint("pin/rm"))
            .query(&[("arg", id.as_str())])
            .send()
            .await
            .map_err(|e| self.transport_error("pin/rm", e))?;

        if !response.status().is_success() {
            let message = error_message(response).await;
            if message.contains("not pinned") {
                return Ok(());
            }
            return Err(RegistryError::Store(format!(
                "IPFS unpin of {} failed: {}",
                id, message
            )));
        }

        Ok(())
    }

    async fn fetch(&self, id: &ContentId) -> Result<Vec<u8>> {
        let response = self
            .client
            .post(self.endpoint("cat"))
            .query(&[("arg", id.as_str())])
            .timeout(self.fetch_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RegistryError::not_found(format!("content {}", id))
                } else {
                    self.transport_error("cat", e)
                }
            })?;

        if !response.status().is_success() {
            let message = error_message(response).await;
            let lowered = message.to_lowercase();
            if lowered.contains("is a directory") {
                return Err(RegistryError::NotAFile(id.to_string()));
            }
            if lowered.contains("not found")
                || lowered.contains("invalid path")
                || lowered.contains("invalid cid")
                || lowered.contains("failed to resolve")
            {
                return Err(RegistryError::not_found(format!("content {}", id)));
            }
            return Err(RegistryError::Store(format!(
                "IPFS cat of {} failed: {}",
                id, message
            )));
        }

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                RegistryError::not_found(format!("content {}", id))
            } else {
                RegistryError::Store(format!("IPFS cat of {} interrupted: {}", id, e))
            }
        })?;

        Ok(bytes.to_vec())
    }
}
