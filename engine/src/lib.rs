//! Spacecore Registry Library
//!
//! This library provides the registry node: content-addressed storage of
//! plugin binaries, a metadata index keyed by name and version, best-effort
//! remote pinning, and peer discovery over the DHT.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Content-addressed storage adapters
pub mod content_store;

/// Metadata index and pin-intent log
pub mod index;

/// Remote pinning (replication) clients
pub mod remote_pin;

/// Peer directory and DHT routing
pub mod peers;

/// Registry orchestration
pub mod registry;

/// HTTP/JSON RPC server
pub mod server;

/// HTTP/JSON RPC client
pub mod client;

/// Node lifecycle
pub mod node;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
