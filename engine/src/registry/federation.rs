//! Federated lookup
//!
//! Extension point for widening a local miss to the rest of the registry
//! network. The registry asks each discovered peer in turn and takes the
//! first descriptor offered. Nothing found this way is written to the local
//! index.

use async_trait::async_trait;
use sdk::{PeerRecord, PluginDescriptor, Result};

/// Ask a remote registry node for a descriptor
#[async_trait]
pub trait Federation: Send + Sync {
    /// Look up `name` on `peer`
    ///
    /// `version` is `None` when the caller wants the peer's latest version.
    /// `Ok(None)` means the peer answered and does not hold the plugin.
    async fn lookup(
        &self,
        peer: &PeerRecord,
        name: &str,
        version: Option<&str>,
    ) -> Result<Option<PluginDescriptor>>;
}
