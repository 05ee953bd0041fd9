//! CLI interface for Spacecore
//!
//! This module provides the command-line interface using clap's derive API.
//! `serve` runs a registry node; every other command is a client of a
//! running node.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Spacecore plugin registry
///
/// Stores plugin binaries in a content-addressed store, indexes them by
/// name and version, and finds other registry nodes over the DHT.
#[derive(Parser, Debug)]
#[command(name = "spacecore")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Registry node to talk to (defaults to the configured listen address)
    #[arg(long, global = true, value_name = "URL", env = "SPACECORE_SERVER")]
    pub server: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a registry node
    Serve {
        /// Keep everything in memory; no IPFS daemon or database needed
        #[arg(long)]
        ephemeral: bool,
    },

    /// Register a plugin binary
    Register {
        /// Plugin name
        name: String,
        /// Plugin version
        version: String,
        /// Path to the binary, as seen by the node
        path: PathBuf,
    },

    /// List plugins, or find one by name
    Discover {
        /// Plugin name (omit to list)
        name: Option<String>,

        /// Exact version (defaults to the latest)
        #[arg(short, long)]
        version: Option<String>,
    },

    /// Show one plugin descriptor
    Get {
        /// Plugin name
        name: String,
        /// Plugin version
        version: String,
    },

    /// Fetch plugin content by content id
    Download {
        /// Content id to fetch
        content_id: String,

        /// Write to this file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Show node identity and peer directory state
    Status,

    /// Unpin content left behind by failed registrations
    Reconcile,
}
