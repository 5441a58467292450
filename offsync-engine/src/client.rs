//! Per-session context object.
//!
//! `OfflineClient` wires the key manager, secure store, cache, queue,
//! coordinator and gateway together once per session. Consumers get a
//! reference to it instead of reaching for a global.

use crate::action_queue::{ActionQueue, ActionState, QueuedAction};
use crate::cache::CacheManager;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::gateway::ApiGateway;
use crate::network::{NetworkObserver, NetworkStatus};
use crate::sync_coordinator::{SyncCoordinator, SyncEvent, SyncOutcome};
use crate::transport::{HttpTransport, Transport};
use crate::types::{ApiResponse, RequestOptions};
use offsync_crypto::{CryptoError, KeyManager};
use offsync_storage::{Clock, SecureStore, SystemClock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Storage-backed half of the client. Absent when the store failed to open.
struct OfflineParts {
    store: SecureStore,
    cache: CacheManager,
    queue: ActionQueue,
    coordinator: Arc<SyncCoordinator>,
}

/// Builder for [`OfflineClient`].
pub struct OfflineClientBuilder {
    config: EngineConfig,
    transport: Option<Arc<dyn Transport>>,
    network: Option<NetworkObserver>,
    clock: Arc<dyn Clock>,
}

impl OfflineClientBuilder {
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn network(mut self, network: NetworkObserver) -> Self {
        self.network = Some(network);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Builds the client, failing if the secure store cannot be opened.
    pub fn build(self) -> EngineResult<OfflineClient> {
        let (mut client, store) = self.assemble()?;
        let store = store?;
        client.attach_store(store);
        Ok(client)
    }

    /// Builds the client. If the secure store cannot be opened the error is
    /// logged and the client runs online-only.
    pub fn build_or_degrade(self) -> EngineResult<OfflineClient> {
        let (mut client, store) = self.assemble()?;
        match store {
            Ok(store) => client.attach_store(store),
            Err(e) => error!("offline storage unavailable, running online-only: {e}"),
        }
        Ok(client)
    }

    fn assemble(self) -> EngineResult<(OfflineClient, EngineResult<SecureStore>)> {
        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => Arc::new(HttpTransport::new(&self.config)?),
        };
        let network = self.network.unwrap_or_default();
        let keys = Arc::new(KeyManager::with_salt(
            self.config.kdf_salt.as_bytes().to_vec(),
            self.config.kdf,
        ));

        let store_config = self.config.store_config();
        let store = match &self.config.db_path {
            Some(path) => SecureStore::open(path, Arc::clone(&keys), store_config),
            None => {
                warn!("no db_path configured, offline data will not survive a restart");
                SecureStore::open_in_memory(Arc::clone(&keys), store_config)
            }
        }
        .map(|s| s.with_clock(self.clock))
        .map_err(EngineError::from);

        let client = OfflineClient {
            gateway: ApiGateway::online_only(Arc::clone(&transport), network.clone()),
            config: self.config,
            keys,
            network,
            transport,
            offline: None,
            tasks: Mutex::new(Vec::new()),
        };
        Ok((client, store))
    }
}

/// The offline-first engine for one session.
pub struct OfflineClient {
    config: EngineConfig,
    keys: Arc<KeyManager>,
    network: NetworkObserver,
    transport: Arc<dyn Transport>,
    gateway: ApiGateway,
    offline: Option<OfflineParts>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl OfflineClient {
    pub fn builder(config: EngineConfig) -> OfflineClientBuilder {
        OfflineClientBuilder {
            config,
            transport: None,
            network: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Opens a client over `transport` and `network`, propagating
    /// `StorageUnavailable`.
    pub fn open(
        config: EngineConfig,
        transport: Arc<dyn Transport>,
        network: NetworkObserver,
    ) -> EngineResult<Self> {
        Self::builder(config).transport(transport).network(network).build()
    }

    /// Like [`open`](Self::open), but falls back to online-only operation
    /// when the secure store cannot be opened.
    pub fn open_or_degrade(
        config: EngineConfig,
        transport: Arc<dyn Transport>,
        network: NetworkObserver,
    ) -> EngineResult<Self> {
        Self::builder(config)
            .transport(transport)
            .network(network)
            .build_or_degrade()
    }

    fn attach_store(&mut self, store: SecureStore) {
        let cache = CacheManager::new(store.clone());
        let queue = ActionQueue::with_max_retries(store.clone(), self.config.max_retries);
        let coordinator = Arc::new(SyncCoordinator::new(
            queue.clone(),
            Arc::clone(&self.transport),
        ));
        self.gateway = ApiGateway::new(
            Arc::clone(&self.transport),
            self.network.clone(),
            cache.clone(),
            queue.clone(),
        );
        self.offline = Some(OfflineParts {
            store,
            cache,
            queue,
            coordinator,
        });
    }

    fn parts(&self) -> EngineResult<&OfflineParts> {
        self.offline.as_ref().ok_or(EngineError::OfflineUnavailable)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// True if the secure store opened and offline features are active.
    pub fn has_offline_storage(&self) -> bool {
        self.offline.is_some()
    }

    /// Derives and installs the session key and hands the session token to
    /// the transport as credentials.
    pub async fn initialize(&self, user_id: &str, session_token: &str) -> EngineResult<()> {
        let keys = Arc::clone(&self.keys);
        let (user, token) = (user_id.to_string(), session_token.to_string());
        tokio::task::spawn_blocking(move || keys.initialize(&user, &token))
            .await
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))??;

        self.transport
            .set_credentials(Some(session_token.to_string()))
            .await;
        info!("offline session initialized for {user_id}");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.keys.is_initialized()
    }

    /// The gateway facade. Never fails; see [`ApiGateway::request`].
    pub async fn request(
        &self,
        endpoint: &str,
        options: RequestOptions,
        enable_queue: bool,
    ) -> ApiResponse {
        self.gateway.request(endpoint, options, enable_queue).await
    }

    pub fn gateway(&self) -> &ApiGateway {
        &self.gateway
    }

    pub fn get_user_data<T: DeserializeOwned>(&self, user_id: &str) -> EngineResult<Option<T>> {
        self.parts()?.cache.get_user_data(user_id)
    }

    pub fn store_user_data<T: Serialize + ?Sized>(
        &self,
        user_id: &str,
        data: &T,
    ) -> EngineResult<()> {
        self.parts()?.cache.store_user_data(user_id, data)
    }

    pub fn get_admin_data<T: DeserializeOwned>(&self, admin_id: &str) -> EngineResult<Option<T>> {
        self.parts()?.cache.get_admin_data(admin_id)
    }

    pub fn store_admin_data<T: Serialize + ?Sized>(
        &self,
        admin_id: &str,
        data: &T,
    ) -> EngineResult<()> {
        self.parts()?.cache.store_admin_data(admin_id, data)
    }

    /// Manually runs a sync cycle.
    pub async fn sync_now(&self) -> EngineResult<SyncOutcome> {
        self.parts()?.coordinator.trigger().await
    }

    /// Logout: drops the session key and the transport credentials, then
    /// wipes all four namespaces. The key is gone even if the wipe fails.
    pub async fn clear_all(&self) -> EngineResult<()> {
        self.keys.clear();
        self.transport.set_credentials(None).await;
        if let Some(parts) = &self.offline {
            parts.store.clear_all()?;
        }
        info!("offline session cleared");
        Ok(())
    }

    pub fn is_online(&self) -> bool {
        self.network.is_online()
    }

    pub fn network_status(&self) -> NetworkStatus {
        self.network.status()
    }

    pub fn network(&self) -> &NetworkObserver {
        &self.network
    }

    /// Actions still waiting for replay.
    pub fn pending_actions(&self) -> EngineResult<Vec<QueuedAction>> {
        self.parts()?.queue.candidates()
    }

    /// Actions that exhausted their replay budget.
    pub fn failed_actions(&self) -> EngineResult<Vec<QueuedAction>> {
        self.parts()?.queue.dead_lettered()
    }

    /// State of one queued action; see [`SyncCoordinator::action_state`].
    pub fn action_state(&self, id: Uuid) -> EngineResult<Option<ActionState>> {
        self.parts()?.coordinator.action_state(id)
    }

    pub fn action_queue(&self) -> EngineResult<&ActionQueue> {
        Ok(&self.parts()?.queue)
    }

    pub fn cache(&self) -> EngineResult<&CacheManager> {
        Ok(&self.parts()?.cache)
    }

    pub fn subscribe_sync(&self) -> EngineResult<broadcast::Receiver<SyncEvent>> {
        Ok(self.parts()?.coordinator.subscribe())
    }

    /// Starts syncing on every offline → online edge.
    pub fn start_network_listener(&self) -> EngineResult<()> {
        let handle = self.parts()?.coordinator.watch_network(&self.network);
        self.track(handle);
        Ok(())
    }

    /// Starts the periodic health probe that drives the network observer.
    pub fn start_probe(&self) {
        let handle = self.network.spawn_probe(
            Arc::clone(&self.transport),
            self.config.probe_path.clone(),
            self.config.probe_interval(),
        );
        self.track(handle);
    }

    fn track(&self, handle: JoinHandle<()>) {
        match self.tasks.lock() {
            Ok(mut tasks) => tasks.push(handle),
            Err(poisoned) => poisoned.into_inner().push(handle),
        }
    }
}

impl Drop for OfflineClient {
    fn drop(&mut self) {
        let tasks = match self.tasks.get_mut() {
            Ok(tasks) => tasks,
            Err(poisoned) => poisoned.into_inner(),
        };
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}
