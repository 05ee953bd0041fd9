//! Remote pinning
//!
//! Best-effort replication of pinned content to a third-party pinning
//! provider. A successful pin yields a public gateway URL; any failure is a
//! [`ReplicationError`] that the registry logs and folds into a degraded
//! reply. Nothing here can fail a registration.

use async_trait::async_trait;
use reqwest::Client;
use sdk::{ContentId, RegistryError, ReplicationError};
use serde::Serialize;
use serde_json::json;

use crate::config::RemotePinConfig;

/// Replication sink
#[async_trait]
pub trait RemotePinService: Send + Sync {
    /// Ask the provider to retain `id`; returns a gateway URL for it
    async fn replicate(&self, id: &ContentId) -> Result<String, ReplicationError>;
}

/// Replication sink used when no provider is configured
#[derive(Debug, Default, Clone)]
pub struct DisabledRemotePin;

#[async_trait]
impl RemotePinService for DisabledRemotePin {
    async fn replicate(&self, _id: &ContentId) -> Result<String, ReplicationError> {
        Err(ReplicationError::NotConfigured)
    }
}

/// Pinata `pinByHash` client
#[derive(Debug, Clone)]
pub struct PinataClient {
    api_base_url: String,
    gateway_url: String,
    host_nodes: Vec<String>,
    credential: String,
    client: Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PinByHashRequest<'a> {
    hash_to_pin: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pinata_options: Option<serde_json::Value>,
}

impl PinataClient {
    pub fn new(
        api_base_url: impl Into<String>,
        gateway_url: impl Into<String>,
        host_nodes: Vec<String>,
        credential: impl Into<String>,
    ) -> Result<Self, RegistryError> {
        let client = Client::builder()
            .user_agent(concat!("spacecore-registry/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RegistryError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            gateway_url: gateway_url.into(),
            host_nodes,
            credential: credential.into(),
            client,
        })
    }

    /// Build a client from config, or `None` when replication is off or
    /// no credential is available
    pub fn from_config(config: &RemotePinConfig) -> Result<Option<Self>, RegistryError> {
        if !config.enabled {
            return Ok(None);
        }
        match &config.credential {
            Some(credential) => Self::new(
                config.api_base_url.clone(),
                config.gateway_url.clone(),
                config.host_nodes.clone(),
                credential.clone(),
            )
            .map(Some),
            None => {
                tracing::warn!(
                    "Remote pinning enabled but no credential set (PINATA_JWT); replication disabled"
                );
                Ok(None)
            }
        }
    }

    /// Public URL for `id` on the provider's gateway
    pub fn gateway_link(&self, id: &ContentId) -> String {
        if self.gateway_url.ends_with('/') {
            format!("{}{}", self.gateway_url, id)
        } else {
            format!("{}/{}", self.gateway_url, id)
        }
    }
}

#[async_trait]
impl RemotePinService for PinataClient {
    async fn replicate(&self, id: &ContentId) -> Result<String, ReplicationError> {
        let pinata_options = if self.host_nodes.is_empty() {
            None
        } else {
            Some(json!({ "hostNodes": self.host_nodes }))
        };
        let body = PinByHashRequest {
            hash_to_pin: id.as_str(),
            pinata_options,
        };

        let url = format!("{}/pinning/pinByHash", self.api_base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.credential)
            .json(&body)
            .send()
            .await
            .map_err(|e| ReplicationError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReplicationError::Rejected {
                content_id: id.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(self.gateway_link(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(gateway: &str) -> PinataClient {
        PinataClient::new("https://api.example", gateway, vec![], "token").unwrap()
    }

    #[test]
    fn gateway_link_joins_cleanly() {
        let id = ContentId::new("/ipfs/bafyplugin");
        assert_eq!(
            client("https://gw.example/ipfs/").gateway_link(&id),
            "https://gw.example/ipfs/bafyplugin"
        );
        assert_eq!(
            client("https://gw.example/ipfs").gateway_link(&id),
            "https://gw.example/ipfs/bafyplugin"
        );
    }

    #[test]
    fn no_credential_means_no_client() {
        let config = RemotePinConfig::default();
        assert!(PinataClient::from_config(&config).unwrap().is_none());
    }

    #[tokio::test]
    async fn disabled_sink_reports_not_configured() {
        let err = DisabledRemotePin
            .replicate(&ContentId::new("bafy"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReplicationError::NotConfigured));
    }
}
