//! RPC client
//!
//! Thin reqwest wrapper over a registry node's HTTP/JSON surface. Error
//! replies are turned back into the matching [`RegistryError`] variant so
//! callers can tell "not found" from "empty listing".

use reqwest::{Client, Response, StatusCode};
use sdk::{
    ContentId, DiscoverPluginsResponse, ErrorBody, GetPluginResponse, PluginDescriptor,
    ReconcileReport, RegisterPluginRequest, RegisterPluginResponse, RegistryError, Result,
    StatusResponse,
};
use serde::de::DeserializeOwned;

/// Client for one registry node
#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: String,
    client: Client,
}

impl RegistryClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("spacecore/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RegistryError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn transport_error(&self, err: reqwest::Error) -> RegistryError {
        if err.is_connect() {
            RegistryError::Store(format!(
                "Cannot reach registry node at {}. Is `spacecore serve` running?",
                self.base_url
            ))
        } else {
            RegistryError::Store(format!("Registry request failed: {}", err))
        }
    }

    async fn check(&self, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => format!("HTTP {}", status),
        };
        Err(match status {
            StatusCode::NOT_FOUND => RegistryError::NotFound(message),
            StatusCode::BAD_REQUEST => RegistryError::InvalidArgument(message),
            StatusCode::UNPROCESSABLE_ENTITY => RegistryError::NotAFile(message),
            StatusCode::GATEWAY_TIMEOUT => RegistryError::DeadlineExceeded(message),
            _ => RegistryError::Store(message),
        })
    }

    async fn decode<T: DeserializeOwned>(&self, response: Response) -> Result<T> {
        let response = self.check(response).await?;
        response
            .json()
            .await
            .map_err(|e| RegistryError::Serialization(format!("Unexpected reply: {}", e)))
    }

    /// Register a plugin from a path on the node's filesystem
    pub async fn register(
        &self,
        name: &str,
        version: &str,
        source_path: &str,
    ) -> Result<RegisterPluginResponse> {
        let request = RegisterPluginRequest {
            name: name.to_string(),
            version: version.to_string(),
            source_path: source_path.to_string(),
        };
        let response = self
            .client
            .post(self.url("/api/plugins"))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        self.decode(response).await
    }

    pub async fn discover(
        &self,
        name: Option<&str>,
        version: Option<&str>,
    ) -> Result<Vec<PluginDescriptor>> {
        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(name) = name {
            query.push(("name", name));
        }
        if let Some(version) = version {
            query.push(("version", version));
        }

        let response = self
            .client
            .get(self.url("/api/plugins"))
            .query(&query)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let reply: DiscoverPluginsResponse = self.decode(response).await?;
        Ok(reply.plugins)
    }

    pub async fn get(&self, name: &str, version: &str) -> Result<PluginDescriptor> {
        let mut url = reqwest::Url::parse(&self.url("/api/plugins"))
            .map_err(|e| RegistryError::Config(format!("Invalid server URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| RegistryError::Config("Server URL cannot be a base".to_string()))?
            .push(name)
            .push(version);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let reply: GetPluginResponse = self.decode(response).await?;
        Ok(reply.plugin)
    }

    pub async fn download(&self, content_id: &ContentId) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(self.url(&format!("/api/content/{}", content_id)))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let response = self.check(response).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?;
        Ok(bytes.to_vec())
    }

    pub async fn status(&self) -> Result<StatusResponse> {
        let response = self
            .client
            .get(self.url("/api/status"))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        self.decode(response).await
    }

    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let response = self
            .client
            .post(self.url("/api/reconcile"))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        self.decode(response).await
    }
}
