//! Content-addressed storage adapter
//!
//! The registry only needs a small capability surface from the content
//! store: add bytes and get back an immutable identifier, pin an identifier
//! so it survives garbage collection, and fetch bytes back.
//!
//! Adding and pinning are separate steps. A store may accept content without
//! retaining it, so callers must never treat `add`/`ingest` alone as durable.

use async_trait::async_trait;
use sdk::{ContentId, RegistryError, Result};
use std::path::Path;

pub mod kubo;
pub mod memory;

pub use kubo::KuboContentStore;
pub use memory::MemoryContentStore;

/// Content store capability surface
///
/// Implementations must be safe for concurrent use; the registry shares one
/// handle across all in-flight requests.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Backend name, for logs
    fn name(&self) -> &str;

    /// Add `bytes` and return their content identifier
    ///
    /// Identical bytes always yield the same identifier.
    ///
    /// # Errors
    ///
    /// `Store` if the underlying add fails.
    async fn add(&self, bytes: Vec<u8>) -> Result<ContentId>;

    /// Read a local file and add its content
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be read, `Store` if the add fails.
    async fn ingest(&self, path: &Path) -> Result<ContentId> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| RegistryError::io(path, e))?;
        tracing::debug!("Ingesting {} bytes from {}", bytes.len(), path.display());
        self.add(bytes).await
    }

    /// Mark content for retention
    ///
    /// # Errors
    ///
    /// `Pin` if the store cannot locate the identifier.
    async fn pin(&self, id: &ContentId) -> Result<()>;

    /// Drop a retention mark. Unpinning content that is not pinned succeeds.
    async fn unpin(&self, id: &ContentId) -> Result<()>;

    /// Fetch the bytes of a single-file identifier
    ///
    /// # Errors
    ///
    /// `NotFound` if the identifier is unknown and not retrievable within the
    /// store's bound, `NotAFile` if it resolves to a directory.
    async fn fetch(&self, id: &ContentId) -> Result<Vec<u8>>;
}
