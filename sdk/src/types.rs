//! Registry data model
//!
//! The descriptor record, content identifiers, peer records and the
//! `plugin:<name>:<version>` key scheme shared by the node and its clients.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{RegistryError, Result};

/// Prefix of every metadata index key holding a plugin descriptor
pub const KEY_PREFIX: &str = "plugin:";

/// Rendezvous string advertised by every node of the registry network
pub const DEFAULT_RENDEZVOUS: &str = "spacecore-registry";

/// Immutable, content-derived identifier of a blob in the content store
///
/// Identical bytes always yield the same identifier. A leading `/ipfs/`
/// is stripped so path-style and bare identifiers compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        match id.strip_prefix("/ipfs/") {
            Some(bare) => Self(bare.to_string()),
            None => Self(id),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// One registered plugin
///
/// Stored as JSON under `plugin:<name>:<version>`. Unknown fields are
/// ignored on read, and records written with the older `cid` field name
/// still decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub name: String,
    pub version: String,
    #[serde(alias = "cid")]
    pub content_id: ContentId,
    #[serde(default)]
    pub path: String,
}

impl PluginDescriptor {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        content_id: ContentId,
        path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            content_id,
            path: path.into(),
        }
    }

    /// Metadata index key for this descriptor
    pub fn key(&self) -> String {
        registry_key(&self.name, &self.version)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(value: &str) -> Result<Self> {
        Ok(serde_json::from_str(value)?)
    }
}

/// Peer discovered through the rendezvous topic. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub peer_id: String,
    #[serde(default)]
    pub addresses: Vec<String>,
}

impl PeerRecord {
    pub fn new(peer_id: impl Into<String>, addresses: Vec<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            addresses,
        }
    }

    /// False for records with an empty or unknown identity
    pub fn is_identified(&self) -> bool {
        !self.peer_id.trim().is_empty()
    }
}

/// Build the metadata key `plugin:<name>:<version>`
pub fn registry_key(name: &str, version: &str) -> String {
    format!("{}{}:{}", KEY_PREFIX, name, version)
}

/// Key prefix covering every version of `name`
pub fn name_prefix(name: &str) -> String {
    format!("{}{}:", KEY_PREFIX, name)
}

/// Split a metadata key back into `(name, version)`
pub fn parse_registry_key(key: &str) -> Option<(&str, &str)> {
    let rest = key.strip_prefix(KEY_PREFIX)?;
    let (name, version) = rest.split_once(':')?;
    if name.is_empty() || version.is_empty() || version.contains(':') {
        return None;
    }
    Some((name, version))
}

/// Reject names and versions that would make a key ambiguous
///
/// `field` is only used in the error message.
pub fn validate_key_component(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(RegistryError::InvalidArgument(format!(
            "{} must not be empty",
            field
        )));
    }
    if value.contains(':') {
        return Err(RegistryError::InvalidArgument(format!(
            "{} must not contain ':' (got {:?})",
            field, value
        )));
    }
    Ok(())
}
