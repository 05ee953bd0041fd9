//! Registry node lifecycle
//!
//! Builds the collaborators from configuration, joins the peer network,
//! runs the periodic reconciliation sweep and serves the RPC surface until
//! shutdown.
//!
//! # Startup
//!
//! 1. Open content store, metadata index and remote pinning client
//! 2. Set up the peer host and advertise the rendezvous topic
//! 3. Spawn the reconciliation task
//! 4. Serve RPC until Ctrl-C or SIGTERM
//!
//! # Shutdown
//!
//! In-flight requests drain, the reconciliation task stops, and the index
//! checkpoints its WAL before closing.

use anyhow::{Context, Result};
use sdk::RegistryError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::content_store::{KuboContentStore, MemoryContentStore};
use crate::index::{MemoryIndex, SqliteIndex};
use crate::peers::{KuboRouting, MemoryNetwork, MemoryRouting, PeerDirectory};
use crate::registry::{RegistryOptions, RegistryService};
use crate::remote_pin::{DisabledRemotePin, PinataClient, RemotePinService};
use crate::server::{self, ServerState};

/// A configured registry node, not yet serving
pub struct Node {
    registry: Arc<RegistryService>,
    sqlite: Option<SqliteIndex>,
    reconcile_interval: Option<Duration>,
}

impl Node {
    /// Production node: Kubo content store and routing, SQLite index,
    /// Pinata replication when a credential is configured
    pub async fn from_config(config: &Config) -> Result<Self> {
        let store = KuboContentStore::new(
            config.content_store.api_url.clone(),
            config.content_store.fetch_timeout(),
        )
        .context("Failed to create content store client")?;

        let sqlite = SqliteIndex::open(&config.index.path)
            .await
            .context("Failed to open metadata index")?;
        let index = Arc::new(sqlite.clone());

        let remote_pin: Arc<dyn RemotePinService> =
            match PinataClient::from_config(&config.remote_pin)
                .context("Failed to create remote pinning client")?
            {
                Some(client) => Arc::new(client),
                None => Arc::new(DisabledRemotePin),
            };

        let mut registry = RegistryService::new(
            Arc::new(store),
            index.clone(),
            index,
            RegistryOptions::from(&config.registry),
        )
        .with_remote_pin(remote_pin);

        if config.peers.enabled {
            let routing = KuboRouting::new(
                config.content_store.api_url.clone(),
                config.registry.operation_timeout(),
            )
            .context("Failed to create routing client")?;
            registry = registry.with_directory(Arc::new(PeerDirectory::new(
                Arc::new(routing),
                config.peers.rendezvous.clone(),
                config.peers.discovery_limit,
            )));
        } else {
            tracing::info!("Peer directory disabled by configuration");
        }

        Ok(Self {
            registry: Arc::new(registry),
            sqlite: Some(sqlite),
            reconcile_interval: config.registry.reconcile_interval(),
        })
    }

    /// Fully in-memory node on its own private peer network
    pub fn ephemeral(config: &Config) -> Self {
        Self::ephemeral_on(config, MemoryNetwork::new())
    }

    /// In-memory node joined to `network`
    pub fn ephemeral_on(config: &Config, network: MemoryNetwork) -> Self {
        let index = Arc::new(MemoryIndex::new());
        let directory = PeerDirectory::new(
            Arc::new(MemoryRouting::new(network)),
            config.peers.rendezvous.clone(),
            config.peers.discovery_limit,
        );

        let registry = RegistryService::new(
            Arc::new(MemoryContentStore::new()),
            index.clone(),
            index,
            RegistryOptions::from(&config.registry),
        )
        .with_directory(Arc::new(directory));

        Self {
            registry: Arc::new(registry),
            sqlite: None,
            reconcile_interval: config.registry.reconcile_interval(),
        }
    }

    pub fn registry(&self) -> Arc<RegistryService> {
        Arc::clone(&self.registry)
    }

    /// Set up the peer host and advertise the rendezvous topic
    ///
    /// Each step is bounded by the operation timeout. A failure here is
    /// fatal to the node.
    pub async fn join_network(&self) -> Result<Option<String>> {
        let Some(directory) = self.registry.directory() else {
            return Ok(None);
        };
        let deadline = self.registry.options().operation_timeout;

        let peer_id = tokio::time::timeout(deadline, directory.setup_host())
            .await
            .map_err(|_| RegistryError::DeadlineExceeded("peer host setup".to_string()))
            .and_then(|result| result)
            .context("Failed to set up peer host")?;
        tokio::time::timeout(deadline, directory.advertise())
            .await
            .map_err(|_| RegistryError::DeadlineExceeded("advertise".to_string()))
            .and_then(|result| result)
            .context("Failed to advertise on the registry network")?;

        tracing::info!(
            "Advertising as {} on topic '{}'",
            peer_id,
            directory.topic()
        );
        Ok(Some(peer_id))
    }

    fn spawn_reconciler(&self) -> Option<JoinHandle<()>> {
        let interval = self.reconcile_interval?;
        let registry = Arc::clone(&self.registry);

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = registry.reconcile().await {
                    tracing::warn!("Reconciliation sweep failed: {}", e);
                }
            }
        }))
    }

    /// Join the network and serve on `listener` until `shutdown` resolves
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Some(peer_id) = self.join_network().await? {
            tracing::info!("Joined registry network as {}", peer_id);
        }

        let reconciler = self.spawn_reconciler();

        let served = server::serve(listener, ServerState::new(self.registry()), shutdown)
            .await
            .context("RPC server failed");

        if let Some(task) = reconciler {
            task.abort();
        }
        if let Some(sqlite) = self.sqlite {
            sqlite.close().await.context("Failed to close metadata index")?;
        }

        tracing::info!("Registry node stopped");
        served
    }
}

/// Resolves on Ctrl-C, or SIGTERM on Unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
