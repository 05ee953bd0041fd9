//! In-memory metadata index
//!
//! Holds serialized descriptors exactly as a remote key/value store would,
//! so decoding failures surface the same way. Enumeration order follows the
//! hash map and is deliberately unspecified.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use sdk::{ContentId, PluginDescriptor, RegistryError, Result};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{unix_now, MetadataIndex, PinIntent, PinIntentLog};

/// Metadata index and pin-intent log held in process memory
#[derive(Default)]
pub struct MemoryIndex {
    entries: RwLock<HashMap<String, String>>,
    intents: RwLock<HashMap<(ContentId, String), u64>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw value under `key` without encoding it
    pub async fn insert_raw(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.write().await.insert(key.into(), value.into());
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Back-date an intent, for exercising the reconciliation grace period
    pub async fn set_intent_time(&self, content_id: &ContentId, registry_key: &str, at: u64) {
        if let Some(recorded_at) = self
            .intents
            .write()
            .await
            .get_mut(&(content_id.clone(), registry_key.to_string()))
        {
            *recorded_at = at;
        }
    }
}

#[async_trait]
impl MetadataIndex for MemoryIndex {
    fn name(&self) -> &str {
        "memory"
    }

    async fn put(&self, key: &str, descriptor: &PluginDescriptor) -> Result<()> {
        let value = descriptor.to_json()?;
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<PluginDescriptor> {
        let entries = self.entries.read().await;
        let value = entries
            .get(key)
            .ok_or_else(|| RegistryError::not_found(key))?;
        PluginDescriptor::from_json(value)
    }

    fn scan_prefix<'a>(
        &'a self,
        prefix: &str,
        limit: usize,
    ) -> BoxStream<'a, Result<PluginDescriptor>> {
        let prefix = prefix.to_string();
        let snapshot = async move {
            let entries = self.entries.read().await;
            let values: Vec<String> = entries
                .iter()
                .filter(|(key, _)| key.starts_with(&prefix))
                .take(limit)
                .map(|(_, value)| value.clone())
                .collect();
            stream::iter(values)
        };

        stream::once(snapshot)
            .flatten()
            .map(|value| PluginDescriptor::from_json(&value))
            .boxed()
    }
}

#[async_trait]
impl PinIntentLog for MemoryIndex {
    async fn record(&self, content_id: &ContentId, registry_key: &str) -> Result<()> {
        self.intents
            .write()
            .await
            .insert((content_id.clone(), registry_key.to_string()), unix_now());
        Ok(())
    }

    async fn clear(&self, content_id: &ContentId, registry_key: &str) -> Result<()> {
        self.intents
            .write()
            .await
            .remove(&(content_id.clone(), registry_key.to_string()));
        Ok(())
    }

    async fn pending(&self) -> Result<Vec<PinIntent>> {
        Ok(self
            .intents
            .read()
            .await
            .iter()
            .map(|((content_id, registry_key), recorded_at)| PinIntent {
                content_id: content_id.clone(),
                registry_key: registry_key.clone(),
                recorded_at: *recorded_at,
            })
            .collect())
    }
}
