//! Spacecore SDK
//!
//! Shared library providing the data model, RPC bodies and error taxonomy of
//! the Spacecore plugin registry. This crate is used by both the registry
//! node and its clients.

/// Error types and handling
pub mod errors;

/// Descriptor, content id and peer record types
pub mod types;

/// RPC request/response bodies
pub mod rpc;

// Re-export commonly used types
pub use errors::{RegistryError, RegistryErrorExt, ReplicationError, Result};
pub use rpc::{
    DiscoverPluginsQuery, DiscoverPluginsResponse, ErrorBody, GetPluginResponse,
    ReconcileReport, RegisterPluginRequest, RegisterPluginResponse, StatusResponse,
};
pub use types::{
    name_prefix, parse_registry_key, registry_key, validate_key_component, ContentId,
    PeerRecord, PluginDescriptor, DEFAULT_RENDEZVOUS, KEY_PREFIX,
};
