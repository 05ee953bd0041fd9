//! Peer directory
//!
//! Owns this node's participation in the registry network: the local peer
//! identity, bootstrap into the DHT, advertisement of the fixed rendezvous
//! topic, and discovery of the other nodes that advertised it.
//!
//! The topic names the registry network as a whole, not any plugin, so
//! discovery answers "who else runs a registry" rather than "who has X".
//!
//! ```text
//! Uninitialized ──setup_host──▶ Bootstrapping ──ok──▶ Ready
//!                                    │
//!                                    └──err/cancel──▶ Failed ──setup_host──▶ Bootstrapping
//! ```
//!
//! Dropping a `setup_host` future part way (a deadline or shutdown) leaves
//! the directory `Failed`, never stuck in `Bootstrapping`.

use async_trait::async_trait;
use futures::future;
use futures::stream::{BoxStream, StreamExt};
use sdk::{PeerRecord, RegistryError, Result};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{info, warn};

pub mod kubo;
pub mod memory;

pub use kubo::KuboRouting;
pub use memory::{MemoryNetwork, MemoryRouting};

/// DHT capability surface used by the directory
#[async_trait]
pub trait Routing: Send + Sync {
    /// Backend name, for logs
    fn name(&self) -> &str;

    /// Create or load the local peer identity
    ///
    /// # Errors
    ///
    /// `HostInit` if no identity can be established.
    async fn local_identity(&self) -> Result<String>;

    /// Join the DHT
    ///
    /// # Errors
    ///
    /// `Bootstrap` if the routing table cannot be populated.
    async fn bootstrap(&self) -> Result<()>;

    /// Register this peer as a provider of `topic`
    async fn provide(&self, topic: &str) -> Result<()>;

    /// Look up at most `limit` providers of `topic`
    async fn find_providers(
        &self,
        topic: &str,
        limit: usize,
    ) -> Result<BoxStream<'static, PeerRecord>>;
}

/// Bootstrap status of the directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryState {
    Uninitialized,
    Bootstrapping,
    Ready { peer_id: String },
    Failed { reason: String },
}

impl DirectoryState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Bootstrapping => "bootstrapping",
            Self::Ready { .. } => "ready",
            Self::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for DirectoryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The node's view of the registry network
pub struct PeerDirectory {
    routing: Arc<dyn Routing>,
    topic: String,
    discovery_limit: usize,
    state: RwLock<DirectoryState>,
}

impl PeerDirectory {
    pub fn new(routing: Arc<dyn Routing>, topic: impl Into<String>, discovery_limit: usize) -> Self {
        Self {
            routing,
            topic: topic.into(),
            discovery_limit,
            state: RwLock::new(DirectoryState::Uninitialized),
        }
    }

    /// The rendezvous topic this directory advertises and searches
    pub fn topic(&self) -> &str {
        &self.topic
    }

    // Never held across an await
    fn read_state(&self) -> RwLockReadGuard<'_, DirectoryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, DirectoryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn state(&self) -> DirectoryState {
        self.read_state().clone()
    }

    pub async fn peer_id(&self) -> Option<String> {
        match &*self.read_state() {
            DirectoryState::Ready { peer_id } => Some(peer_id.clone()),
            _ => None,
        }
    }

    pub async fn is_ready(&self) -> bool {
        matches!(*self.read_state(), DirectoryState::Ready { .. })
    }

    /// Establish the local identity and bootstrap into the DHT
    ///
    /// Calling this on a ready directory returns the existing identity. A
    /// failed directory may be set up again.
    ///
    /// # Errors
    ///
    /// `HostInit` or `Bootstrap` from the routing backend; `HostInit` if a
    /// setup is already in progress.
    pub async fn setup_host(&self) -> Result<String> {
        {
            let mut state = self.write_state();
            match &*state {
                DirectoryState::Ready { peer_id } => return Ok(peer_id.clone()),
                DirectoryState::Bootstrapping => {
                    return Err(RegistryError::HostInit(
                        "peer host setup already in progress".to_string(),
                    ))
                }
                DirectoryState::Uninitialized | DirectoryState::Failed { .. } => {}
            }
            *state = DirectoryState::Bootstrapping;
        }

        let _cancelled = SetupGuard { directory: self };

        info!("Setting up peer host via {} routing", self.routing.name());
        let result = async {
            let peer_id = self.routing.local_identity().await?;
            self.routing.bootstrap().await?;
            Ok::<_, RegistryError>(peer_id)
        }
        .await;

        let mut state = self.write_state();
        match result {
            Ok(peer_id) => {
                info!("Peer host ready: {}", peer_id);
                *state = DirectoryState::Ready {
                    peer_id: peer_id.clone(),
                };
                Ok(peer_id)
            }
            Err(e) => {
                warn!("Peer host setup failed: {}", e);
                *state = DirectoryState::Failed {
                    reason: e.to_string(),
                };
                Err(e)
            }
        }
    }

    async fn ensure_ready(&self) -> Result<()> {
        let state = self.read_state();
        match &*state {
            DirectoryState::Ready { .. } => Ok(()),
            other => Err(RegistryError::Discovery(format!(
                "peer directory is {}",
                other
            ))),
        }
    }

    /// Advertise this node under the rendezvous topic
    pub async fn advertise(&self) -> Result<()> {
        self.ensure_ready().await?;
        self.routing.provide(&self.topic).await?;
        info!("Advertised rendezvous topic '{}'", self.topic);
        Ok(())
    }

    /// Lazily enumerate peers that advertised the rendezvous topic
    ///
    /// Records with an empty identity are dropped before they are yielded.
    pub async fn discover_peers(&self) -> Result<BoxStream<'static, PeerRecord>> {
        self.ensure_ready().await?;
        let providers = self
            .routing
            .find_providers(&self.topic, self.discovery_limit)
            .await?;
        Ok(providers
            .filter(|peer| future::ready(peer.is_identified()))
            .boxed())
    }
}

/// Moves a setup that never finished from `Bootstrapping` to `Failed`
struct SetupGuard<'a> {
    directory: &'a PeerDirectory,
}

impl Drop for SetupGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.directory.write_state();
        if *state == DirectoryState::Bootstrapping {
            warn!("Peer host setup cancelled");
            *state = DirectoryState::Failed {
                reason: "setup cancelled".to_string(),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Routing double whose bootstrap fails a set number of times
    struct FlakyRouting {
        failures_left: AtomicUsize,
    }

    #[async_trait]
    impl Routing for FlakyRouting {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn local_identity(&self) -> Result<String> {
            Ok("peer-flaky".to_string())
        }

        async fn bootstrap(&self) -> Result<()> {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(RegistryError::Bootstrap("no reachable peers".to_string()));
            }
            Ok(())
        }

        async fn provide(&self, _topic: &str) -> Result<()> {
            Ok(())
        }

        async fn find_providers(
            &self,
            _topic: &str,
            _limit: usize,
        ) -> Result<BoxStream<'static, PeerRecord>> {
            Ok(stream::iter(vec![
                PeerRecord::new("", vec![]),
                PeerRecord::new("peer-a", vec!["/ip4/10.0.0.1/tcp/4001".to_string()]),
                PeerRecord::new("  ", vec![]),
            ])
            .boxed())
        }
    }

    /// Routing double whose first bootstrap never completes
    struct HangsOnce {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Routing for HangsOnce {
        fn name(&self) -> &str {
            "hangs-once"
        }

        async fn local_identity(&self) -> Result<String> {
            Ok("peer-slow".to_string())
        }

        async fn bootstrap(&self) -> Result<()> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                future::pending::<()>().await;
            }
            Ok(())
        }

        async fn provide(&self, _topic: &str) -> Result<()> {
            Ok(())
        }

        async fn find_providers(
            &self,
            _topic: &str,
            _limit: usize,
        ) -> Result<BoxStream<'static, PeerRecord>> {
            Ok(stream::empty().boxed())
        }
    }

    fn directory(failures: usize) -> PeerDirectory {
        PeerDirectory::new(
            Arc::new(FlakyRouting {
                failures_left: AtomicUsize::new(failures),
            }),
            "spacecore-registry",
            10,
        )
    }

    #[tokio::test]
    async fn failed_bootstrap_can_be_retried() {
        let directory = directory(1);

        let err = directory.setup_host().await.unwrap_err();
        assert!(matches!(err, RegistryError::Bootstrap(_)));
        assert_eq!(directory.state().await.label(), "failed");

        assert_eq!(directory.setup_host().await.unwrap(), "peer-flaky");
        assert_eq!(directory.peer_id().await.as_deref(), Some("peer-flaky"));
    }

    #[tokio::test]
    async fn cancelled_setup_can_be_retried() {
        let directory = PeerDirectory::new(
            Arc::new(HangsOnce {
                calls: AtomicUsize::new(0),
            }),
            "spacecore-registry",
            10,
        );

        let timed_out =
            tokio::time::timeout(std::time::Duration::from_millis(50), directory.setup_host())
                .await;
        assert!(timed_out.is_err());
        assert_eq!(
            directory.state().await,
            DirectoryState::Failed {
                reason: "setup cancelled".to_string()
            }
        );

        assert_eq!(directory.setup_host().await.unwrap(), "peer-slow");
        assert!(directory.is_ready().await);
    }

    #[tokio::test]
    async fn operations_require_ready_state() {
        let directory = directory(0);
        assert!(matches!(
            directory.advertise().await.unwrap_err(),
            RegistryError::Discovery(_)
        ));
        assert!(directory.discover_peers().await.is_err());
    }

    #[tokio::test]
    async fn unidentified_peers_are_filtered() {
        let directory = directory(0);
        directory.setup_host().await.unwrap();

        let peers: Vec<PeerRecord> = directory.discover_peers().await.unwrap().collect().await;
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].peer_id, "peer-a");
    }
}
