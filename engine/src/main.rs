// Spacecore plugin registry
// Main entry point for the spacecore binary

use anyhow::Context;
use clap::Parser;
use spacecore_registry::cli::{Cli, Command};
use spacecore_registry::config::Config;
use spacecore_registry::handlers::{
    client_for, handle_discover, handle_download, handle_get, handle_reconcile, handle_register,
    handle_status, OutputFormat,
};
use spacecore_registry::node::{shutdown_signal, Node};
use spacecore_registry::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // RUST_LOG wins over --log, which wins over the config file
    let level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(level);

    tracing::debug!(
        "Spacecore v{} ({} - {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    if let Command::Serve { ephemeral } = cli.command {
        let node = if ephemeral {
            tracing::info!("Starting ephemeral in-memory node");
            Node::ephemeral(&config)
        } else {
            Node::from_config(&config).await?
        };

        let listener = tokio::net::TcpListener::bind(&config.server.listen_addr)
            .await
            .with_context(|| format!("Failed to bind {}", config.server.listen_addr))?;

        return node.run(listener, shutdown_signal()).await;
    }

    let client = client_for(cli.server.as_deref(), &config)?;

    match cli.command {
        Command::Register {
            name,
            version,
            path,
        } => handle_register(&client, &name, &version, &path, format).await,

        Command::Discover { name, version } => {
            handle_discover(&client, name.as_deref(), version.as_deref(), format).await
        }

        Command::Get { name, version } => handle_get(&client, &name, &version, format).await,

        Command::Download { content_id, output } => {
            handle_download(&client, &content_id, output.as_deref(), format).await
        }

        Command::Status => handle_status(&client, format).await,

        Command::Reconcile => handle_reconcile(&client, format).await,

        Command::Serve { .. } => Ok(()),
    }
}
