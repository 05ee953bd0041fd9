//! Kubo DHT routing
//!
//! Uses the Kubo node's own libp2p host: its identity, its bootstrap list
//! and its `routing/*` commands. A topic string is turned into a content id
//! by storing its bytes as a raw block; providers of that block are the
//! peers that advertised the topic.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use sdk::{PeerRecord, RegistryError, Result};
use serde::Deserialize;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, warn};

use super::Routing;

/// `routing/findprovs` event type carrying provider records
const PROVIDER_EVENT: i32 = 4;

/// Routing backend driving a Kubo daemon's DHT
#[derive(Debug, Clone)]
pub struct KuboRouting {
    base_url: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct IdResponse {
    #[serde(rename = "ID")]
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PeerListResponse {
    #[serde(default)]
    peers: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BlockPutResponse {
    key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RoutingEvent {
    #[serde(rename = "Type")]
    kind: i32,
    #[serde(default)]
    responses: Option<Vec<RoutingPeer>>,
}

#[derive(Debug, Deserialize)]
struct RoutingPeer {
    #[serde(rename = "ID", default)]
    id: String,
    #[serde(rename = "Addrs", default)]
    addrs: Option<Vec<String>>,
}

impl KuboRouting {
    /// Create a routing client; `request_timeout` bounds each RPC call,
    /// including a provider lookup's streamed body
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("spacecore-registry/", env!("CARGO_PKG_VERSION")))
            .timeout(request_timeout)
            .build()
            .map_err(|e| RegistryError::HostInit(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn endpoint(&self, command: &str) -> String {
        format!("{}/api/v0/{}", self.base_url, command)
    }

    async fn call(&self, command: &str, query: &[(&str, &str)]) -> std::result::Result<Response, String> {
        let response = self
            .client
            .post(self.endpoint(command))
            .query(query)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    format!("cannot connect to IPFS at {}", self.base_url)
                } else {
                    format!("{} request failed: {}", command, e)
                }
            })?;

        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(format!("{} returned {}: {}", command, status, body.trim()))
        }
    }

    /// Content id of the raw block holding `topic`
    async fn topic_cid(&self, topic: &str) -> Result<String> {
        let form = Form::new().part("data", Part::bytes(topic.as_bytes().to_vec()));
        let response = self
            .client
            .post(self.endpoint("block/put"))
            .query(&[("cid-codec", "raw"), ("mhtype", "sha2-256")])
            .multipart(form)
            .send()
            .await
            .map_err(|e| RegistryError::Discovery(format!("block/put failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(RegistryError::Discovery(format!(
                "block/put returned {}",
                response.status()
            )));
        }

        let put: BlockPutResponse = response
            .json()
            .await
            .map_err(|e| RegistryError::Discovery(format!("Unexpected block/put reply: {}", e)))?;
        Ok(put.key)
    }
}

/// Provider records in one NDJSON line of `routing/findprovs` output
fn parse_providers(line: &[u8]) -> Vec<PeerRecord> {
    let trimmed = match std::str::from_utf8(line) {
        Ok(text) => text.trim(),
        Err(_) => return Vec::new(),
    };
    if trimmed.is_empty() {
        return Vec::new();
    }

    match serde_json::from_str::<RoutingEvent>(trimmed) {
        Ok(event) if event.kind == PROVIDER_EVENT => event
            .responses
            .unwrap_or_default()
            .into_iter()
            .map(|peer| PeerRecord::new(peer.id, peer.addrs.unwrap_or_default()))
            .collect(),
        Ok(_) => Vec::new(),
        Err(e) => {
            debug!("Skipping unparseable routing event: {}", e);
            Vec::new()
        }
    }
}

#[async_trait]
impl Routing for KuboRouting {
    fn name(&self) -> &str {
        "kubo"
    }

    async fn local_identity(&self) -> Result<String> {
        let response = self
            .call("id", &[])
            .await
            .map_err(RegistryError::HostInit)?;
        let id: IdResponse = response
            .json()
            .await
            .map_err(|e| RegistryError::HostInit(format!("Unexpected id reply: {}", e)))?;

        if id.id.trim().is_empty() {
            return Err(RegistryError::HostInit("IPFS node reported no peer id".to_string()));
        }
        Ok(id.id)
    }

    async fn bootstrap(&self) -> Result<()> {
        let response = self
            .call("bootstrap/list", &[])
            .await
            .map_err(RegistryError::Bootstrap)?;
        let list: PeerListResponse = response
            .json()
            .await
            .map_err(|e| RegistryError::Bootstrap(format!("Unexpected bootstrap reply: {}", e)))?;

        let bootstrap_peers = list.peers.map_or(0, |peers| peers.len());
        if bootstrap_peers == 0 {
            return Err(RegistryError::Bootstrap(
                "IPFS node has no bootstrap peers configured".to_string(),
            ));
        }

        match self.call("swarm/peers", &[]).await {
            Ok(response) => {
                let connected = response
                    .json::<PeerListResponse>()
                    .await
                    .ok()
                    .and_then(|list| list.peers)
                    .map_or(0, |peers| peers.len());
                if connected == 0 {
                    warn!("IPFS node has no connected peers yet; DHT queries may be empty");
                }
                debug!(
                    "Bootstrap: {} configured peers, {} connected",
                    bootstrap_peers, connected
                );
                Ok(())
            }
            Err(e) => Err(RegistryError::Bootstrap(e)),
        }
    }

    async fn provide(&self, topic: &str) -> Result<()> {
        let cid = self.topic_cid(topic).await?;
        self.call("routing/provide", &[("arg", cid.as_str())])
            .await
            .map_err(RegistryError::Discovery)?;
        debug!("Providing topic '{}' as {}", topic, cid);
        Ok(())
    }

    async fn find_providers(
        &self,
        topic: &str,
        limit: usize,
    ) -> Result<BoxStream<'static, PeerRecord>> {
        let cid = self.topic_cid(topic).await?;
        let num_providers = limit.to_string();
        let response = self
            .call(
                "routing/findprovs",
                &[("arg", cid.as_str()), ("num-providers", num_providers.as_str())],
            )
            .await
            .map_err(RegistryError::Discovery)?;

        let body = Box::pin(response.bytes_stream());
        let peers = stream::unfold(
            (body, Vec::<u8>::new(), VecDeque::<PeerRecord>::new(), false),
            |(mut body, mut buf, mut queue, mut done)| async move {
                loop {
                    if let Some(peer) = queue.pop_front() {
                        return Some((peer, (body, buf, queue, done)));
                    }
                    if done {
                        return None;
                    }

                    match body.next().await {
                        Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
                        Some(Err(e)) => {
                            warn!("Provider stream interrupted: {}", e);
                            done = true;
                        }
                        None => done = true,
                    }

                    while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = buf.drain(..=pos).collect();
                        queue.extend(parse_providers(&line));
                    }
                    if done && !buf.is_empty() {
                        let rest = std::mem::take(&mut buf);
                        queue.extend(parse_providers(&rest));
                    }
                }
            },
        );

        Ok(peers.take(limit).boxed())
    }
}
