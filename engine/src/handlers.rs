//! Command handlers for CLI operations
//!
//! This module implements the handlers for every client command:
//! - register: Register a plugin binary with a node
//! - discover: List plugins or resolve one by name
//! - get: Show one descriptor
//! - download: Fetch content by content id
//! - status: Node identity and peer directory state
//! - reconcile: Trigger a reconciliation sweep

use anyhow::{Context, Result};
use sdk::{ContentId, PluginDescriptor};
use serde_json::json;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::client::RegistryClient;
use crate::config::Config;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Client for the node named by `--server`, or the configured listen address
pub fn client_for(server: Option<&str>, config: &Config) -> Result<RegistryClient> {
    let base_url = match server {
        Some(url) => url.to_string(),
        None => format!("http://{}", config.server.listen_addr),
    };
    RegistryClient::new(base_url).context("Failed to create registry client")
}

fn print_descriptor(plugin: &PluginDescriptor) {
    println!("{} {}", plugin.name, plugin.version);
    println!("  Content ID: {}", plugin.content_id);
    if !plugin.path.is_empty() {
        println!("  Source:     {}", plugin.path);
    }
}

/// Absolute form of `path` when it exists locally, so a node on the same
/// host resolves it the same way
fn resolve_source(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

pub async fn handle_register(
    client: &RegistryClient,
    name: &str,
    version: &str,
    path: &Path,
    format: OutputFormat,
) -> Result<()> {
    let source = resolve_source(path);
    let reply = client
        .register(name, version, &source.to_string_lossy())
        .await
        .with_context(|| format!("Failed to register {} {}", name, version))?;

    match format {
        OutputFormat::Text => {
            println!("{}", reply.message);
            println!("  Content ID: {}", reply.content_id);
            println!("  Reference:  {}", reply.reference_url);
            if !reply.replicated {
                println!("  (not replicated to remote pinning)");
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&reply)?);
        }
    }

    Ok(())
}

pub async fn handle_discover(
    client: &RegistryClient,
    name: Option<&str>,
    version: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let plugins = client
        .discover(name, version)
        .await
        .context("Failed to discover plugins")?;

    match format {
        OutputFormat::Text => {
            if plugins.is_empty() {
                println!("No plugins registered");
                return Ok(());
            }
            for plugin in &plugins {
                print_descriptor(plugin);
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "plugins": plugins,
                "count": plugins.len(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

pub async fn handle_get(
    client: &RegistryClient,
    name: &str,
    version: &str,
    format: OutputFormat,
) -> Result<()> {
    let plugin = client
        .get(name, version)
        .await
        .with_context(|| format!("Failed to get {} {}", name, version))?;

    match format {
        OutputFormat::Text => print_descriptor(&plugin),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plugin)?),
    }

    Ok(())
}

pub async fn handle_download(
    client: &RegistryClient,
    content_id: &str,
    output: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let content_id = ContentId::new(content_id);
    let bytes = client
        .download(&content_id)
        .await
        .with_context(|| format!("Failed to download {}", content_id))?;

    match output {
        Some(path) => {
            tokio::fs::write(path, &bytes)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            match format {
                OutputFormat::Text => {
                    println!("Wrote {} bytes to {}", bytes.len(), path.display())
                }
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "content_id": content_id,
                        "bytes": bytes.len(),
                        "output": path,
                    }))?
                ),
            }
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes).context("Failed to write to stdout")?;
            stdout.flush().context("Failed to flush stdout")?;
        }
    }

    Ok(())
}

pub async fn handle_status(client: &RegistryClient, format: OutputFormat) -> Result<()> {
    let status = client
        .status()
        .await
        .with_context(|| format!("Failed to reach node at {}", client.base_url()))?;

    match format {
        OutputFormat::Text => {
            println!("Spacecore registry v{}", status.version);
            println!("  Node:      {}", client.base_url());
            println!(
                "  Peer ID:   {}",
                status.peer_id.as_deref().unwrap_or("(none)")
            );
            println!("  Directory: {}", status.directory_state);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
    }

    Ok(())
}

pub async fn handle_reconcile(client: &RegistryClient, format: OutputFormat) -> Result<()> {
    let report = client
        .reconcile()
        .await
        .context("Reconciliation failed")?;

    match format {
        OutputFormat::Text => {
            println!("Reconciliation complete");
            println!("  Examined: {}", report.examined);
            println!("  Unpinned: {}", report.unpinned);
            println!("  Retained: {}", report.retained);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_flag_overrides_listen_addr() {
        let config = Config::default();
        let client = client_for(Some("http://10.1.2.3:9000"), &config).unwrap();
        assert_eq!(client.base_url(), "http://10.1.2.3:9000");

        let client = client_for(None, &config).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:50051");
    }

    #[test]
    fn missing_source_is_passed_through() {
        let path = Path::new("/definitely/not/here.wasm");
        assert_eq!(resolve_source(path), path);
    }
}
