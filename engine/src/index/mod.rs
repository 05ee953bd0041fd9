//! Metadata index
//!
//! Maps `plugin:<name>:<version>` keys to serialized plugin descriptors.
//! Entries never expire; a later `put` for the same key overwrites.
//!
//! The same backends also keep the pin-intent log used to find content that
//! was pinned by a registration whose descriptor never got indexed.

use async_trait::async_trait;
use futures::stream::BoxStream;
use sdk::{ContentId, PluginDescriptor, Result};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryIndex;
pub use sqlite::SqliteIndex;

/// Descriptor store keyed by registry key
#[async_trait]
pub trait MetadataIndex: Send + Sync {
    /// Backend name, for logs
    fn name(&self) -> &str;

    /// Serialize and store `descriptor` under `key`, overwriting
    ///
    /// # Errors
    ///
    /// `Serialization` if encoding fails, `Store` if the write fails.
    async fn put(&self, key: &str, descriptor: &PluginDescriptor) -> Result<()>;

    /// Exact lookup
    ///
    /// # Errors
    ///
    /// `NotFound` if absent, `Serialization` if the stored value does not
    /// decode, `Store` if the read fails.
    async fn get(&self, key: &str) -> Result<PluginDescriptor>;

    /// Lazily enumerate up to `limit` descriptors whose key starts with `prefix`
    ///
    /// The stream is finite and cannot be restarted. Order is whatever the
    /// backend's key enumeration yields.
    fn scan_prefix<'a>(
        &'a self,
        prefix: &str,
        limit: usize,
    ) -> BoxStream<'a, Result<PluginDescriptor>>;
}

/// A content id pinned on behalf of a registration not yet indexed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinIntent {
    pub content_id: ContentId,
    pub registry_key: String,
    /// Seconds since the Unix epoch
    pub recorded_at: u64,
}

/// Write-ahead record of pins awaiting their descriptor
#[async_trait]
pub trait PinIntentLog: Send + Sync {
    /// Note that `content_id` is about to be pinned for `registry_key`
    async fn record(&self, content_id: &ContentId, registry_key: &str) -> Result<()>;

    /// Forget the intent once the descriptor is indexed or the pin is undone
    async fn clear(&self, content_id: &ContentId, registry_key: &str) -> Result<()>;

    /// Every outstanding intent
    async fn pending(&self) -> Result<Vec<PinIntent>>;
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
