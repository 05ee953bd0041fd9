//! In-process routing
//!
//! A [`MemoryNetwork`] is a shared provider table; every [`MemoryRouting`]
//! attached to the same network sees the others' advertisements. Used by
//! `serve --ephemeral` and by multi-node tests.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use sdk::{PeerRecord, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::Routing;

/// Provider table shared by in-process peers
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    providers: Arc<RwLock<HashMap<String, Vec<PeerRecord>>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider record for `topic`, replacing one with the same id
    pub async fn announce(&self, topic: &str, record: PeerRecord) {
        let mut providers = self.providers.write().await;
        let entry = providers.entry(topic.to_string()).or_default();
        entry.retain(|existing| existing.peer_id != record.peer_id);
        entry.push(record);
    }

    pub async fn provider_count(&self, topic: &str) -> usize {
        self.providers
            .read()
            .await
            .get(topic)
            .map_or(0, |records| records.len())
    }
}

/// Routing backend attached to a [`MemoryNetwork`]
pub struct MemoryRouting {
    network: MemoryNetwork,
    identity: PeerRecord,
}

impl MemoryRouting {
    /// Join `network` with a fresh random identity
    pub fn new(network: MemoryNetwork) -> Self {
        let peer_id = format!("mem-{}", uuid::Uuid::new_v4().simple());
        Self::with_identity(network, PeerRecord::new(peer_id, Vec::new()))
    }

    pub fn with_identity(network: MemoryNetwork, identity: PeerRecord) -> Self {
        Self { network, identity }
    }
}

#[async_trait]
impl Routing for MemoryRouting {
    fn name(&self) -> &str {
        "memory"
    }

    async fn local_identity(&self) -> Result<String> {
        Ok(self.identity.peer_id.clone())
    }

    async fn bootstrap(&self) -> Result<()> {
        Ok(())
    }

    async fn provide(&self, topic: &str) -> Result<()> {
        self.network.announce(topic, self.identity.clone()).await;
        Ok(())
    }

    async fn find_providers(
        &self,
        topic: &str,
        limit: usize,
    ) -> Result<BoxStream<'static, PeerRecord>> {
        let records: Vec<PeerRecord> = self
            .network
            .providers
            .read()
            .await
            .get(topic)
            .map(|records| records.iter().take(limit).cloned().collect())
            .unwrap_or_default();
        Ok(stream::iter(records).boxed())
    }
}
