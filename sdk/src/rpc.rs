//! RPC request and response bodies
//!
//! JSON shapes exchanged between `spacecore` clients and a registry node.

use serde::{Deserialize, Serialize};

use crate::types::{ContentId, PluginDescriptor};

/// RegisterPlugin request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterPluginRequest {
    pub name: String,
    pub version: String,
    /// Path of the plugin binary on the node's filesystem
    #[serde(alias = "plugin")]
    pub source_path: String,
}

/// RegisterPlugin response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterPluginResponse {
    pub message: String,
    /// Gateway URL when replication succeeded, otherwise the content id
    pub reference_url: String,
    pub content_id: ContentId,
    pub replicated: bool,
}

/// DiscoverPlugins query parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoverPluginsQuery {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// DiscoverPlugins response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverPluginsResponse {
    pub plugins: Vec<PluginDescriptor>,
}

/// GetPlugin response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetPluginResponse {
    pub plugin: PluginDescriptor,
}

/// Node status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub peer_id: Option<String>,
    pub directory_state: String,
    pub version: String,
}

/// Outcome of one reconciliation sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Intents older than the grace period
    pub examined: usize,
    /// Orphaned content ids that were unpinned
    pub unpinned: usize,
    /// Content ids still referenced by a descriptor
    pub retained: usize,
}

/// Error body returned with every non-2xx reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub hint: String,
}
