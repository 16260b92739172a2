//! Long-lived handles shared by every view of the dashboard.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::info;

use crate::application::error::AppError;
use crate::application::hooks::DataHooks;
use crate::application::mutations::MutationDispatcher;
use crate::application::repos::TdsApi;
use crate::cache::{CacheConfig, QueryCache};
use crate::config::Settings;
use crate::infra::rest::ApiClient;
use crate::realtime::SocketChannel;
use crate::util::lock::mutex_lock;

const SOURCE: &str = "application::context";

/// Owns the API client, the query cache and the push channel.
///
/// Built once at startup and torn down once through [`AppContext::shutdown`].
pub struct AppContext {
    api: Arc<dyn TdsApi>,
    cache: QueryCache,
    socket: SocketChannel,
    hooks: DataHooks,
    mutations: MutationDispatcher,
    collector: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl AppContext {
    pub fn new(settings: &Settings) -> Result<Self, AppError> {
        let api: Arc<dyn TdsApi> = Arc::new(ApiClient::new(&settings.api)?);
        let cache = QueryCache::new(CacheConfig::from(&settings.cache));
        let socket = SocketChannel::from_settings(&settings.socket, settings.api.token.clone());
        Ok(Self::with_parts(api, cache, socket))
    }

    pub fn with_parts(api: Arc<dyn TdsApi>, cache: QueryCache, socket: SocketChannel) -> Self {
        let hooks = DataHooks::new(Arc::clone(&api), cache.clone(), socket.clone());
        let mutations = MutationDispatcher::new(Arc::clone(&api), cache.clone());
        Self {
            api,
            cache,
            socket,
            hooks,
            mutations,
            collector: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Connect the push channel and start the cache sweeper. Must run
    /// inside a tokio runtime.
    pub fn start(&self) {
        self.socket.connect();
        let mut collector = mutex_lock(&self.collector, SOURCE, "start");
        if collector.is_none() {
            *collector = Some(self.cache.spawn_collector());
        }
    }

    /// Disconnect the channel and stop background work. Later calls are no-ops.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.socket.disconnect();
        if let Some(handle) = mutex_lock(&self.collector, SOURCE, "shutdown").take() {
            handle.abort();
        }
        info!(entries = self.cache.len(), "Dashboard context shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    pub fn api(&self) -> &Arc<dyn TdsApi> {
        &self.api
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn socket(&self) -> &SocketChannel {
        &self.socket
    }

    pub fn hooks(&self) -> &DataHooks {
        &self.hooks
    }

    pub fn mutations(&self) -> &MutationDispatcher {
        &self.mutations
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}
