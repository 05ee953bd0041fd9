//! Error types and handling
//!
//! This module provides the error types used throughout the Spacecore registry.
//! All errors implement the `RegistryErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! Two families exist:
//!
//! - [`RegistryError`]: every failure an operation reports to its caller.
//! - [`ReplicationError`]: remote pinning failures. These never fail an
//!   operation; the registry logs them and degrades its reply instead.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Trait for registry error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information.
pub trait RegistryErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to display to remote users: it carries no
    /// credentials, no file paths and no content-store internals.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried or worked around. Non-recoverable
    /// errors typically require operator intervention.
    fn is_recoverable(&self) -> bool;
}

/// Main registry error type
///
/// # Error Categories
///
/// - **Local files**: `Io`
/// - **Content store**: `Store`, `Pin`, `NotAFile`
/// - **Lookups**: `NotFound`
/// - **Metadata index**: `Serialization`, `Store`
/// - **Registration**: `Registration` wraps whichever step failed
/// - **Peer directory**: `HostInit`, `Bootstrap`, `Discovery`
/// - **Requests**: `DeadlineExceeded`, `InvalidArgument`
///
/// # Examples
///
/// ```
/// use sdk::errors::{RegistryError, RegistryErrorExt};
///
/// let error = RegistryError::not_found("plugin:missing:9.9");
/// assert!(error.is_not_found());
/// assert!(error.is_recoverable());
///
/// let fatal = RegistryError::Serialization("bad record".to_string());
/// assert!(!fatal.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum RegistryError {
    // Local file access
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Content store errors
    #[error("Content store error: {0}")]
    Store(String),

    #[error("Failed to pin {content_id}: {reason}")]
    Pin { content_id: String, reason: String },

    #[error("Content {0} is not a single file")]
    NotAFile(String),

    // Lookup errors
    #[error("Not found: {0}")]
    NotFound(String),

    // Metadata errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Composite registration failure
    #[error("Registration of {key} failed: {source}")]
    Registration {
        key: String,
        #[source]
        source: Box<RegistryError>,
    },

    // Peer directory errors
    #[error("Host initialization failed: {0}")]
    HostInit(String),

    #[error("Bootstrap failed: {0}")]
    Bootstrap(String),

    #[error("Peer discovery failed: {0}")]
    Discovery(String),

    // Request errors
    #[error("Deadline exceeded during {0}")]
    DeadlineExceeded(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RegistryError {
    /// Creates an `Io` error for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a `NotFound` error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Creates a `Pin` error.
    pub fn pin(content_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Pin {
            content_id: content_id.into(),
            reason: reason.into(),
        }
    }

    /// Wraps a step failure as a `Registration` error for `key`.
    pub fn registration(key: impl Into<String>, source: RegistryError) -> Self {
        Self::Registration {
            key: key.into(),
            source: Box::new(source),
        }
    }

    /// Returns true if this error means the key or content id is unknown.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl RegistryErrorExt for RegistryError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Io { .. } => "The plugin file could not be read. Check the path and permissions",

            Self::Store(_) => "Content store unavailable. Check that the IPFS daemon is running",
            Self::Pin { .. } => "Content could not be pinned. Check content store health",
            Self::NotAFile(_) => "The content identifier names a directory, not a plugin binary",

            Self::NotFound(_) => "No plugin is registered under this name and version",

            Self::Serialization(_) => "A stored plugin record is corrupted",

            Self::Registration { source, .. } => source.user_hint(),

            Self::HostInit(_) => "The peer host could not start. Check network configuration",
            Self::Bootstrap(_) => "Could not join the peer network. Check bootstrap peers",
            Self::Discovery(_) => "Peer discovery failed. Try again later",

            Self::DeadlineExceeded(_) => "The operation took too long. Try again",
            Self::InvalidArgument(_) => "Check the plugin name and version",

            Self::Config(_) => "Check your config.toml file for errors",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Registration { source, .. } => source.is_recoverable(),

            // Non-recoverable errors
            Self::Serialization(_) | Self::HostInit(_) | Self::Config(_) => false,

            // All other errors are potentially recoverable
            _ => true,
        }
    }
}

/// Remote pinning failures
///
/// Replication is a durability enhancement only. These errors are logged
/// and folded into a degraded registration reply; they never propagate.
#[derive(Debug, Error)]
pub enum ReplicationError {
    #[error("Remote pinning is not configured")]
    NotConfigured,

    #[error("Remote pinning rejected {content_id}: HTTP {status}")]
    Rejected { content_id: String, status: u16 },

    #[error("Remote pinning request failed: {0}")]
    Network(String),
}
