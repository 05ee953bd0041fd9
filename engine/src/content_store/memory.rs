//! In-memory content store
//!
//! Addresses content by its SHA-256 digest. Used by `serve --ephemeral`
//! and as the content store substitute in tests. Unpinned blobs are dropped
//! by [`MemoryContentStore::collect_garbage`], mirroring a real store's GC.

use async_trait::async_trait;
use sdk::{ContentId, RegistryError, Result};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use super::ContentStore;

#[derive(Default)]
struct Blobs {
    data: HashMap<ContentId, Vec<u8>>,
    pinned: HashSet<ContentId>,
}

/// Content store held entirely in process memory
#[derive(Default)]
pub struct MemoryContentStore {
    blobs: RwLock<Blobs>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content identifier for `content`: hex SHA-256 digest
    pub fn content_id_for(content: &[u8]) -> ContentId {
        let mut hasher = Sha256::new();
        hasher.update(content);
        ContentId::new(hex::encode(hasher.finalize()))
    }

    pub async fn is_pinned(&self, id: &ContentId) -> bool {
        self.blobs.read().await.pinned.contains(id)
    }

    pub async fn contains(&self, id: &ContentId) -> bool {
        self.blobs.read().await.data.contains_key(id)
    }

    /// Drop every unpinned blob, returning how many were removed
    pub async fn collect_garbage(&self) -> usize {
        let mut blobs = self.blobs.write().await;
        let Blobs { data, pinned } = &mut *blobs;
        let before = data.len();
        data.retain(|id, _| pinned.contains(id));
        before - data.len()
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn add(&self, bytes: Vec<u8>) -> Result<ContentId> {
        let id = Self::content_id_for(&bytes);
        self.blobs.write().await.data.entry(id.clone()).or_insert(bytes);
        Ok(id)
    }

    async fn pin(&self, id: &ContentId) -> Result<()> {
        let mut blobs = self.blobs.write().await;
        if !blobs.data.contains_key(id) {
            return Err(RegistryError::pin(id.as_str(), "content not found locally"));
        }
        blobs.pinned.insert(id.clone());
        Ok(())
    }

    async fn unpin(&self, id: &ContentId) -> Result<()> {
        self.blobs.write().await.pinned.remove(id);
        Ok(())
    }

    async fn fetch(&self, id: &ContentId) -> Result<Vec<u8>> {
        self.blobs
            .read()
            .await
            .data
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::not_found(format!("content {}", id)))
    }
}
