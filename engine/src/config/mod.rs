//! Configuration management
//!
//! This module handles loading, validation, and management of the registry
//! node configuration. Configuration is stored in TOML format at
//! ~/.spacecore/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory
//! - **server**: RPC listen address
//! - **content_store**: IPFS RPC endpoint and fetch bound
//! - **index**: Metadata index location
//! - **remote_pin**: Remote pinning provider settings
//! - **peers**: Peer directory and rendezvous topic
//! - **registry**: Listing cap, deadlines, write serialisation, reconciliation
//!
//! # Environment Overrides
//!
//! Collaborator settings may come from the environment instead of the file:
//!
//! | Variable | Setting |
//! |---|---|
//! | `SPACECORE_INDEX_PATH` | `index.path` |
//! | `SPACECORE_IPFS_API` | `content_store.api_url` |
//! | `PINATA_API_URL` | `remote_pin.api_base_url` |
//! | `PINATA_JWT` (or `JWT`) | remote pinning bearer credential |
//!
//! The credential is never read from or written to the config file.
//!
//! # Examples
//!
//! ```no_run
//! use spacecore_registry::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Listening on {}", config.server.listen_addr);
//! # Ok(())
//! # }
//! ```

use sdk::errors::RegistryError;
use sdk::DEFAULT_RENDEZVOUS;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core node settings
    pub core: CoreConfig,

    /// RPC server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Content store (IPFS RPC) settings
    #[serde(default)]
    pub content_store: ContentStoreConfig,

    /// Metadata index settings
    #[serde(default)]
    pub index: IndexConfig,

    /// Remote pinning settings
    #[serde(default)]
    pub remote_pin: RemotePinConfig,

    /// Peer directory settings
    #[serde(default)]
    pub peers: PeersConfig,

    /// Orchestration settings
    #[serde(default)]
    pub registry: RegistryConfig,
}

/// Core node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// RPC server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the RPC server binds to
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

/// Content store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentStoreConfig {
    /// Base URL of the IPFS (Kubo) RPC API
    #[serde(default = "default_ipfs_api")]
    pub api_url: String,

    /// Upper bound for fetching content that may live on other peers (seconds)
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

/// Metadata index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// SQLite database path (supports ~ expansion)
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
}

/// Remote pinning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemotePinConfig {
    /// Enable best-effort replication to the remote pinning provider
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Base URL of the pinning provider API
    #[serde(default = "default_pin_api_url")]
    pub api_base_url: String,

    /// Public gateway prefix; the content id is appended
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    /// Multiaddrs the provider should fetch content from
    #[serde(default)]
    pub host_nodes: Vec<String>,

    /// Bearer credential, environment only
    #[serde(skip)]
    pub credential: Option<String>,
}

/// Peer directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeersConfig {
    /// Join the registry network on startup
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Rendezvous string shared by every registry node
    #[serde(default = "default_rendezvous")]
    pub rendezvous: String,

    /// Maximum providers returned by one discovery
    #[serde(default = "default_discovery_limit")]
    pub discovery_limit: usize,
}

/// Upper bound for `registry.list_limit`
pub const MAX_LIST_LIMIT: usize = 10;

/// `reconcile_grace_secs` must exceed this many operation timeouts
pub const GRACE_TIMEOUT_FACTOR: u64 = 3;

/// Orchestration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Cap on the unnamed Discover listing
    #[serde(default = "default_list_limit")]
    pub list_limit: usize,

    /// Deadline applied to each collaborator call (seconds)
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,

    /// Hold a per-key lock across Pin..Put
    #[serde(default)]
    pub serialize_writes: bool,

    /// Interval between reconciliation sweeps (seconds, 0 disables)
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,

    /// Age a pin intent must reach before a sweep may act on it (seconds)
    #[serde(default = "default_reconcile_grace")]
    pub reconcile_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

impl Default for ContentStoreConfig {
    fn default() -> Self {
        Self {
            api_url: default_ipfs_api(),
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
        }
    }
}

impl Default for RemotePinConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_base_url: default_pin_api_url(),
            gateway_url: default_gateway_url(),
            host_nodes: Vec::new(),
            credential: None,
        }
    }
}

impl Default for PeersConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rendezvous: default_rendezvous(),
            discovery_limit: default_discovery_limit(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            list_limit: default_list_limit(),
            operation_timeout_secs: default_operation_timeout(),
            serialize_writes: false,
            reconcile_interval_secs: default_reconcile_interval(),
            reconcile_grace_secs: default_reconcile_grace(),
        }
    }
}

impl RegistryConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    pub fn reconcile_grace(&self) -> Duration {
        Duration::from_secs(self.reconcile_grace_secs)
    }

    /// Sweep interval, or `None` when periodic reconciliation is off
    pub fn reconcile_interval(&self) -> Option<Duration> {
        (self.reconcile_interval_secs > 0).then(|| Duration::from_secs(self.reconcile_interval_secs))
    }
}

impl ContentStoreConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.spacecore")
}

fn default_listen_addr() -> String {
    "127.0.0.1:50051".to_string()
}

fn default_ipfs_api() -> String {
    "http://127.0.0.1:5001".to_string()
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_index_path() -> PathBuf {
    PathBuf::from("~/.spacecore/registry.db")
}

fn default_pin_api_url() -> String {
    "https://api.pinata.cloud".to_string()
}

fn default_gateway_url() -> String {
    "https://gateway.pinata.cloud/ipfs/".to_string()
}

fn default_rendezvous() -> String {
    DEFAULT_RENDEZVOUS.to_string()
}

fn default_discovery_limit() -> usize {
    20
}

fn default_list_limit() -> usize {
    10
}

fn default_operation_timeout() -> u64 {
    60
}

fn default_reconcile_interval() -> u64 {
    3600
}

fn default_reconcile_grace() -> u64 {
    900
}

impl Default for Config {
    fn default() -> Self {
        Self {
            core: CoreConfig {
                log_level: default_log_level(),
                data_dir: default_data_dir(),
            },
            server: ServerConfig::default(),
            content_store: ContentStoreConfig::default(),
            index: IndexConfig::default(),
            remote_pin: RemotePinConfig::default(),
            peers: PeersConfig::default(),
            registry: RegistryConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.spacecore/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, RegistryError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_from_path(path: &Path) -> Result<Self, RegistryError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| RegistryError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| RegistryError::Config(format!("Failed to parse config: {}", e)))?;

        config.apply_env_overrides();
        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, RegistryError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                RegistryError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let mut config = Self::default();

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| RegistryError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| RegistryError::Config(format!("Failed to write config file: {}", e)))?;

        config.apply_env_overrides();
        config.validate_and_process()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.spacecore/config.toml)
    fn default_config_path() -> Result<PathBuf, RegistryError> {
        let home = dirs::home_dir().ok_or_else(|| {
            RegistryError::Config("Could not determine home directory".to_string())
        })?;

        Ok(home.join(".spacecore").join("config.toml"))
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(path) = lookup("SPACECORE_INDEX_PATH") {
            self.index.path = PathBuf::from(path);
        }
        if let Some(url) = lookup("SPACECORE_IPFS_API") {
            self.content_store.api_url = url;
        }
        if let Some(url) = lookup("PINATA_API_URL") {
            self.remote_pin.api_base_url = url;
        }
        if let Some(token) = lookup("PINATA_JWT").or_else(|| lookup("JWT")) {
            self.remote_pin.credential = Some(token);
        }
    }

    /// Validate and process configuration
    ///
    /// This method:
    /// - Validates levels, addresses, URLs and limits
    /// - Expands ~ in paths
    /// - Creates the data directory and the index parent directory
    ///
    /// # Errors
    ///
    /// Returns an error if any field is invalid or a directory cannot be created.
    pub fn validate_and_process(&mut self) -> Result<(), RegistryError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(RegistryError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        self.server
            .listen_addr
            .parse::<SocketAddr>()
            .map_err(|e| {
                RegistryError::Config(format!(
                    "Invalid listen_addr '{}': {}",
                    self.server.listen_addr, e
                ))
            })?;

        validate_url("content_store.api_url", &self.content_store.api_url)?;
        if self.remote_pin.enabled {
            validate_url("remote_pin.api_base_url", &self.remote_pin.api_base_url)?;
            validate_url("remote_pin.gateway_url", &self.remote_pin.gateway_url)?;
        }

        if self.peers.rendezvous.trim().is_empty() {
            return Err(RegistryError::Config(
                "peers.rendezvous must not be empty".to_string(),
            ));
        }
        if self.peers.discovery_limit == 0 {
            return Err(RegistryError::Config(
                "peers.discovery_limit must be at least 1".to_string(),
            ));
        }

        if !(1..=MAX_LIST_LIMIT).contains(&self.registry.list_limit) {
            return Err(RegistryError::Config(format!(
                "registry.list_limit must be between 1 and {}",
                MAX_LIST_LIMIT
            )));
        }
        if self.registry.operation_timeout_secs == 0 {
            return Err(RegistryError::Config(
                "registry.operation_timeout_secs must be at least 1".to_string(),
            ));
        }
        // A registration spans ingest..put; intents must outlive that window
        let min_grace = self
            .registry
            .operation_timeout_secs
            .saturating_mul(GRACE_TIMEOUT_FACTOR);
        if self.registry.reconcile_grace_secs <= min_grace {
            return Err(RegistryError::Config(format!(
                "registry.reconcile_grace_secs must exceed {} ({} x operation_timeout_secs)",
                min_grace, GRACE_TIMEOUT_FACTOR
            )));
        }
        if self.content_store.fetch_timeout_secs == 0 {
            return Err(RegistryError::Config(
                "content_store.fetch_timeout_secs must be at least 1".to_string(),
            ));
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;
        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                RegistryError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        self.index.path = expand_path(&self.index.path)?;

        Ok(())
    }
}

fn validate_url(field: &str, url: &str) -> Result<(), RegistryError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(RegistryError::Config(format!(
            "{} must be an http(s) URL, got '{}'",
            field, url
        )))
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, RegistryError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| RegistryError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(|| {
            RegistryError::Config("Could not determine home directory".to_string())
        })?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| RegistryError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_creation() {
        let config = Config::default();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.registry.list_limit, 10);
        assert_eq!(config.peers.rendezvous, "spacecore-registry");
        assert!(!config.registry.serialize_writes);
        assert!(config.remote_pin.credential.is_none());
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let path = PathBuf::from("~/test");
        let expanded = expand_path(&path).unwrap();

        let home = dirs::home_dir().unwrap();
        assert_eq!(expanded, home.join("test"));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = PathBuf::from("/absolute/path");
        let expanded = expand_path(&path).unwrap();

        assert_eq!(expanded, path);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("SPACECORE_INDEX_PATH", "/var/lib/spacecore/index.db"),
            ("JWT", "legacy-token"),
            ("PINATA_API_URL", "http://localhost:9999"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.index.path, PathBuf::from("/var/lib/spacecore/index.db"));
        assert_eq!(config.remote_pin.credential.as_deref(), Some("legacy-token"));
        assert_eq!(config.remote_pin.api_base_url, "http://localhost:9999");
        assert_eq!(config.content_store.api_url, "http://127.0.0.1:5001");
    }

    #[test]
    fn test_pinata_jwt_wins_over_jwt() {
        let mut config = Config::default();
        config.apply_overrides(|name| match name {
            "PINATA_JWT" => Some("new".to_string()),
            "JWT" => Some("old".to_string()),
            _ => None,
        });
        assert_eq!(config.remote_pin.credential.as_deref(), Some("new"));
    }

    #[test]
    fn test_credential_never_serialized() {
        let mut config = Config::default();
        config.remote_pin.credential = Some("secret-token".to_string());
        let toml_string = toml::to_string(&config).unwrap();
        assert!(!toml_string.contains("secret-token"));

        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert!(deserialized.remote_pin.credential.is_none());
        assert_eq!(config.server.listen_addr, deserialized.server.listen_addr);
    }

    #[test]
    fn test_invalid_listen_addr_rejected() {
        let mut config = Config::default();
        config.server.listen_addr = "not-an-address".to_string();
        let err = config.validate_and_process().unwrap_err();
        assert!(err.to_string().contains("listen_addr"));
    }

    #[test]
    fn test_zero_list_limit_rejected() {
        let mut config = Config::default();
        config.registry.list_limit = 0;
        assert!(config.validate_and_process().is_err());
    }

    #[test]
    fn test_list_limit_above_cap_rejected() {
        let mut config = Config::default();
        config.core.data_dir = std::env::temp_dir();
        config.registry.list_limit = MAX_LIST_LIMIT + 1;
        let err = config.validate_and_process().unwrap_err();
        assert!(err.to_string().contains("list_limit"));
    }

    #[test]
    fn test_grace_must_outlast_registration_window() {
        for (grace, timeout) in [(0, 60), (180, 60), (900, 300)] {
            let mut config = Config::default();
            config.core.data_dir = std::env::temp_dir();
            config.registry.reconcile_grace_secs = grace;
            config.registry.operation_timeout_secs = timeout;
            let err = config.validate_and_process().unwrap_err();
            assert!(
                err.to_string().contains("reconcile_grace_secs"),
                "grace {} with timeout {} should be rejected",
                grace,
                timeout
            );
        }

        let mut config = Config::default();
        config.core.data_dir = std::env::temp_dir();
        config.registry.reconcile_grace_secs = 181;
        config.registry.operation_timeout_secs = 60;
        assert!(config.validate_and_process().is_ok());
    }
}
