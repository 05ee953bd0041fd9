//! Registry service
//!
//! Orchestrates the content store, metadata index, pin-intent log, remote
//! pinning and peer directory into the four registry operations:
//!
//! - **register**: ingest, pin, replicate (best effort), index
//! - **discover**: bounded listing, exact lookup, or latest version of a name
//! - **get**: exact lookup by name and version
//! - **download**: fetch content bytes by content id
//!
//! plus **reconcile**, the sweep that unpins content left behind by
//! registrations that pinned but never indexed.
//!
//! Every collaborator call is bounded by the operation timeout. A plugin is
//! only reported as registered once its content is pinned and its
//! descriptor is indexed.

use futures::{StreamExt, TryStreamExt};
use sdk::{
    name_prefix, registry_key, validate_key_component, ContentId, PluginDescriptor,
    ReconcileReport, RegistryError, ReplicationError, Result, StatusResponse, KEY_PREFIX,
};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::{RegistryConfig, MAX_LIST_LIMIT};
use crate::content_store::ContentStore;
use crate::index::{unix_now, MetadataIndex, PinIntentLog};
use crate::peers::PeerDirectory;
use crate::remote_pin::{DisabledRemotePin, RemotePinService};

pub mod federation;
pub mod locks;
pub mod version;

pub use federation::Federation;
pub use locks::KeyLocks;

/// Tunables for [`RegistryService`]
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// Cap for a nameless discover
    pub list_limit: usize,
    /// Bound for each collaborator call
    pub operation_timeout: Duration,
    /// Hold a per-key lock across pin and index
    pub serialize_writes: bool,
    /// Minimum age of a pin intent before reconciliation acts on it
    pub reconcile_grace: Duration,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self::from(&RegistryConfig::default())
    }
}

impl From<&RegistryConfig> for RegistryOptions {
    fn from(config: &RegistryConfig) -> Self {
        Self {
            list_limit: config.list_limit,
            operation_timeout: config.operation_timeout(),
            serialize_writes: config.serialize_writes,
            reconcile_grace: config.reconcile_grace(),
        }
    }
}

/// Outcome of a successful registration
#[derive(Debug, Clone)]
pub struct Registration {
    pub descriptor: PluginDescriptor,
    /// Gateway URL if replicated, otherwise the content id
    pub reference: String,
    pub replicated: bool,
}

impl Registration {
    pub fn message(&self) -> String {
        format!(
            "Plugin {} {} registered successfully",
            self.descriptor.name, self.descriptor.version
        )
    }
}

/// The registry node's operations over its injected collaborators
pub struct RegistryService {
    store: Arc<dyn ContentStore>,
    index: Arc<dyn MetadataIndex>,
    intents: Arc<dyn PinIntentLog>,
    remote_pin: Arc<dyn RemotePinService>,
    directory: Option<Arc<PeerDirectory>>,
    federation: Option<Arc<dyn Federation>>,
    options: RegistryOptions,
    key_locks: KeyLocks,
    content_locks: KeyLocks,
}

impl RegistryService {
    /// Create a service with replication disabled and no peer directory
    pub fn new(
        store: Arc<dyn ContentStore>,
        index: Arc<dyn MetadataIndex>,
        intents: Arc<dyn PinIntentLog>,
        options: RegistryOptions,
    ) -> Self {
        Self {
            store,
            index,
            intents,
            remote_pin: Arc::new(DisabledRemotePin),
            directory: None,
            federation: None,
            options,
            key_locks: KeyLocks::new(),
            content_locks: KeyLocks::new(),
        }
    }

    pub fn with_remote_pin(mut self, remote_pin: Arc<dyn RemotePinService>) -> Self {
        self.remote_pin = remote_pin;
        self
    }

    pub fn with_directory(mut self, directory: Arc<PeerDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn with_federation(mut self, federation: Arc<dyn Federation>) -> Self {
        self.federation = Some(federation);
        self
    }

    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    pub fn directory(&self) -> Option<&Arc<PeerDirectory>> {
        self.directory.as_ref()
    }

    async fn bounded<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.options.operation_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(RegistryError::DeadlineExceeded(operation.to_string())),
        }
    }

    /// Store, pin and index a plugin binary
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty name or version or one containing
    /// `:`. Any failure after validation is a `Registration` error wrapping
    /// the failed step; the plugin must then be treated as not registered.
    pub async fn register(
        &self,
        name: &str,
        version: &str,
        path: impl AsRef<Path>,
    ) -> Result<Registration> {
        validate_key_component("name", name)?;
        validate_key_component("version", version)?;
        let path = path.as_ref();
        let key = registry_key(name, version);

        info!("Registering {} from {}", key, path.display());
        self.register_steps(&key, name, version, path)
            .await
            .map_err(|e| {
                error!("Registration of {} failed: {}", key, e);
                RegistryError::registration(&key, e)
            })
    }

    async fn register_steps(
        &self,
        key: &str,
        name: &str,
        version: &str,
        path: &Path,
    ) -> Result<Registration> {
        let content_id = self.bounded("ingest", self.store.ingest(path)).await?;
        debug!("Ingested {} as {}", path.display(), content_id);

        let _key_guard = if self.options.serialize_writes {
            Some(self.key_locks.acquire(key).await)
        } else {
            None
        };
        // Held until the intent is cleared; reconcile skips content ids it cannot take
        let _content_guard = self.content_locks.acquire(content_id.as_str()).await;

        self.bounded("pin intent", self.intents.record(&content_id, key))
            .await?;
        self.bounded("pin", self.store.pin(&content_id)).await?;
        debug!("Pinned {}", content_id);

        let (reference, replicated) = self.replicate(&content_id).await;

        let descriptor =
            PluginDescriptor::new(name, version, content_id.clone(), path.to_string_lossy());
        self.bounded("index put", self.index.put(key, &descriptor))
            .await?;

        // Registered from here on; a stale intent is cleared by the next sweep
        if let Err(e) = self
            .bounded("pin intent clear", self.intents.clear(&content_id, key))
            .await
        {
            warn!("Could not clear pin intent for {}: {}", key, e);
        }

        info!("Registered {} -> {}", key, content_id);
        Ok(Registration {
            descriptor,
            reference,
            replicated,
        })
    }

    /// Best-effort remote pin; returns the reference to hand back
    async fn replicate(&self, content_id: &ContentId) -> (String, bool) {
        let result = tokio::time::timeout(
            self.options.operation_timeout,
            self.remote_pin.replicate(content_id),
        )
        .await
        .unwrap_or_else(|_| Err(ReplicationError::Network("request timed out".to_string())));

        match result {
            Ok(url) => {
                info!("Replicated {} to {}", content_id, url);
                (url, true)
            }
            Err(ReplicationError::NotConfigured) => {
                debug!("Remote pinning not configured; skipping replication");
                (content_id.to_string(), false)
            }
            Err(e) => {
                warn!("Replication of {} failed, continuing: {}", content_id, e);
                (content_id.to_string(), false)
            }
        }
    }

    /// Find plugins
    ///
    /// - no name: up to `list_limit` (at most ten) arbitrary descriptors,
    ///   possibly none
    /// - name and version: the exact descriptor
    /// - name only: the highest registered version
    ///
    /// A version given without a name is ignored.
    ///
    /// # Errors
    ///
    /// `NotFound` when a named lookup has no match.
    pub async fn discover(
        &self,
        name: Option<&str>,
        version: Option<&str>,
    ) -> Result<Vec<PluginDescriptor>> {
        let name = name.map(str::trim).filter(|n| !n.is_empty());
        let version = version.map(str::trim).filter(|v| !v.is_empty());

        let Some(name) = name else {
            if version.is_some() {
                debug!("Ignoring version filter without a plugin name");
            }
            return self.list().await;
        };

        let found = match version {
            Some(version) => self.get(name, version).await?,
            None => self.latest(name).await?,
        };
        Ok(vec![found])
    }

    async fn list(&self) -> Result<Vec<PluginDescriptor>> {
        let listing: Vec<PluginDescriptor> = self
            .bounded(
                "index scan",
                self.index
                    .scan_prefix(KEY_PREFIX, self.options.list_limit.min(MAX_LIST_LIMIT))
                    .try_collect(),
            )
            .await?;
        debug!("Listing returned {} plugins", listing.len());
        Ok(listing)
    }

    async fn latest(&self, name: &str) -> Result<PluginDescriptor> {
        validate_key_component("name", name)?;
        let prefix = name_prefix(name);
        let versions: Vec<PluginDescriptor> = self
            .bounded(
                "index scan",
                self.index.scan_prefix(&prefix, usize::MAX).try_collect(),
            )
            .await?;

        if let Some(found) = version::latest(versions) {
            return Ok(found);
        }
        match self.federated_lookup(name, None).await {
            Some(found) => Ok(found),
            None => Err(RegistryError::not_found(format!("plugin {}", name))),
        }
    }

    /// Exact lookup of `(name, version)`
    ///
    /// # Errors
    ///
    /// `NotFound` if neither the local index nor a federated peer holds it.
    pub async fn get(&self, name: &str, version: &str) -> Result<PluginDescriptor> {
        validate_key_component("name", name)?;
        validate_key_component("version", version)?;
        let key = registry_key(name, version);

        match self.bounded("index get", self.index.get(&key)).await {
            Ok(descriptor) => Ok(descriptor),
            Err(e) if e.is_not_found() => match self.federated_lookup(name, Some(version)).await {
                Some(descriptor) => Ok(descriptor),
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    /// Ask discovered peers for a descriptor this node does not hold
    async fn federated_lookup(&self, name: &str, version: Option<&str>) -> Option<PluginDescriptor> {
        let (Some(federation), Some(directory)) = (&self.federation, &self.directory) else {
            return None;
        };
        if !directory.is_ready().await {
            debug!("Peer directory not ready; skipping federated lookup");
            return None;
        }
        let local = directory.peer_id().await;

        let search = async {
            let mut peers = match directory.discover_peers().await {
                Ok(peers) => peers,
                Err(e) => {
                    warn!("Peer discovery for federated lookup failed: {}", e);
                    return None;
                }
            };

            while let Some(peer) = peers.next().await {
                if local.as_deref() == Some(peer.peer_id.as_str()) {
                    continue;
                }
                match federation.lookup(&peer, name, version).await {
                    Ok(Some(descriptor)) => {
                        info!("Found {} {} on peer {}", name, descriptor.version, peer.peer_id);
                        return Some(descriptor);
                    }
                    Ok(None) => {}
                    Err(e) => debug!("Peer {} lookup failed: {}", peer.peer_id, e),
                }
            }
            None
        };

        match tokio::time::timeout(self.options.operation_timeout, search).await {
            Ok(found) => found,
            Err(_) => {
                warn!("Federated lookup for {} timed out", name);
                None
            }
        }
    }

    /// Fetch the bytes of `content_id`
    ///
    /// # Errors
    ///
    /// `NotFound` if the content cannot be resolved, `NotAFile` if it is a
    /// directory.
    pub async fn download(&self, content_id: &ContentId) -> Result<Vec<u8>> {
        if content_id.is_empty() {
            return Err(RegistryError::InvalidArgument(
                "content id must not be empty".to_string(),
            ));
        }
        let bytes = self.bounded("fetch", self.store.fetch(content_id)).await?;
        debug!("Fetched {} bytes for {}", bytes.len(), content_id);
        Ok(bytes)
    }

    /// Unpin content whose registration never reached the index
    ///
    /// Only intents older than the grace period are examined. A content id
    /// still referenced by some descriptor is kept; so is one with a younger
    /// intent or a registration currently between intent and index.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let now = unix_now();
        let grace = self.options.reconcile_grace.as_secs();

        let pending = self.bounded("pin intent scan", self.intents.pending()).await?;
        let (stale, young): (Vec<_>, Vec<_>) = pending
            .into_iter()
            .partition(|intent| now.saturating_sub(intent.recorded_at) >= grace);
        if stale.is_empty() {
            return Ok(report);
        }
        let in_flight: HashSet<ContentId> =
            young.into_iter().map(|intent| intent.content_id).collect();

        // Claim each candidate; a held lock means a registration is mid-flight
        let mut guards = HashMap::new();
        for intent in &stale {
            let id = &intent.content_id;
            if in_flight.contains(id) || guards.contains_key(id) {
                continue;
            }
            match self.content_locks.try_acquire(id.as_str()).await {
                Some(guard) => {
                    guards.insert(id.clone(), guard);
                }
                None => debug!("{} is being registered; leaving it", id),
            }
        }
        if guards.is_empty() {
            return Ok(report);
        }

        // Re-read under the locks: registrations that finished meanwhile
        // cleared their intents and indexed their descriptors
        let still_pending: HashSet<(ContentId, String)> = self
            .bounded("pin intent scan", self.intents.pending())
            .await?
            .into_iter()
            .map(|intent| (intent.content_id, intent.registry_key))
            .collect();
        let referenced: HashSet<ContentId> = self
            .bounded(
                "index scan",
                self.index
                    .scan_prefix(KEY_PREFIX, usize::MAX)
                    .map_ok(|descriptor| descriptor.content_id)
                    .try_collect(),
            )
            .await?;

        let mut unpinned: HashSet<ContentId> = HashSet::new();
        for intent in stale {
            if !guards.contains_key(&intent.content_id)
                || !still_pending
                    .contains(&(intent.content_id.clone(), intent.registry_key.clone()))
            {
                continue;
            }
            report.examined += 1;

            if referenced.contains(&intent.content_id) {
                report.retained += 1;
            } else if !unpinned.contains(&intent.content_id) {
                if let Err(e) = self.bounded("unpin", self.store.unpin(&intent.content_id)).await {
                    warn!("Could not unpin orphan {}: {}", intent.content_id, e);
                    continue;
                }
                info!(
                    "Unpinned orphaned content {} (from {})",
                    intent.content_id, intent.registry_key
                );
                unpinned.insert(intent.content_id.clone());
                report.unpinned += 1;
            }

            self.bounded(
                "pin intent clear",
                self.intents.clear(&intent.content_id, &intent.registry_key),
            )
            .await?;
        }
        drop(guards);

        info!(
            "Reconciliation: {} examined, {} unpinned, {} retained",
            report.examined, report.unpinned, report.retained
        );
        Ok(report)
    }

    /// Node identity and directory state
    pub async fn status(&self) -> StatusResponse {
        let (peer_id, directory_state) = match &self.directory {
            Some(directory) => (directory.peer_id().await, directory.state().await.to_string()),
            None => (None, "disabled".to_string()),
        };
        StatusResponse {
            peer_id,
            directory_state,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
