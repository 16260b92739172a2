//! Key-addressed async result cache.
//!
//! Each [`QueryKey`] owns one entry holding the last successful payload and
//! its fetch status. At most one fetch per key is in flight; callers that
//! arrive while it runs await the same shared future. Stale data is served
//! immediately while a background refetch runs.

use std::any::Any;
use std::collections::HashMap;
use std::collections::hash_map::Entry as MapEntry;
use std::error::Error as StdError;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use metrics::{counter, gauge, histogram};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::util::lock::mutex_lock;

use super::config::CacheConfig;
use super::keys::{KeyFilter, QueryKey};
use super::metrics::{
    ENTRIES, FETCH_DEDUPED_TOTAL, FETCH_ERROR_TOTAL, FETCH_MS, FETCH_TOTAL, HIT_TOTAL,
    INVALIDATION_TOTAL, MISS_TOTAL, STALE_HIT_TOTAL,
};
use super::observer::{QueryObserver, QuerySnapshot};

const SOURCE: &str = "cache::query";

pub(crate) type ErasedData = Arc<dyn Any + Send + Sync>;
type FetchResult = Result<ErasedData, QueryError>;
type FetchFuture = BoxFuture<'static, FetchResult>;
type Fetcher = Arc<dyn Fn() -> FetchFuture + Send + Sync>;
type SharedFetch = Shared<FetchFuture>;

/// A fetch failure stored on a cache entry. Cheap to clone.
#[derive(Debug, Clone, Error)]
#[error("{inner}")]
pub struct QueryError {
    inner: Arc<dyn StdError + Send + Sync>,
}

impl QueryError {
    pub fn new<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(err),
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self::new(MessageError(message.into()))
    }

    /// Borrow the original error when it has the given type.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        self.inner.downcast_ref::<E>()
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
struct MessageError(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryStatus {
    #[default]
    Idle,
    Fetching,
    Success,
    Error,
}

impl QueryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryStatus::Idle => "idle",
            QueryStatus::Fetching => "fetching",
            QueryStatus::Success => "success",
            QueryStatus::Error => "error",
        }
    }
}

/// Per-call overrides of the cache defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptions {
    pub stale_time: Option<Duration>,
    /// Polling period while at least one observer is mounted.
    pub refetch_interval: Option<Duration>,
    pub retry: Option<u32>,
}

impl QueryOptions {
    pub fn polling(interval: Duration) -> Self {
        Self {
            refetch_interval: Some(interval),
            ..Self::default()
        }
    }

    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }

    pub fn with_retry(mut self, retry: u32) -> Self {
        self.retry = Some(retry);
        self
    }
}

#[derive(Clone, Default)]
pub(crate) struct QueryState {
    pub(crate) data: Option<ErasedData>,
    pub(crate) status: QueryStatus,
    pub(crate) error: Option<QueryError>,
    pub(crate) updated_at: Option<Instant>,
    pub(crate) fetched_at: Option<OffsetDateTime>,
    pub(crate) invalidated: bool,
    pub(crate) fetch_count: u64,
    pub(crate) invalidation_count: u64,
}

impl QueryState {
    pub(crate) fn is_stale(&self, stale_time: Duration) -> bool {
        if self.invalidated {
            return true;
        }
        match self.updated_at {
            Some(updated_at) => updated_at.elapsed() >= stale_time,
            None => true,
        }
    }
}

struct Entry {
    state: watch::Sender<QueryState>,
    fetcher: Option<Fetcher>,
    in_flight: Option<SharedFetch>,
    refetch_pending: bool,
    observers: usize,
    stale_time: Duration,
    retry: u32,
    unobserved_since: Option<Instant>,
}

impl Entry {
    fn new(config: &CacheConfig) -> Self {
        let (state, _) = watch::channel(QueryState::default());
        Self {
            state,
            fetcher: None,
            in_flight: None,
            refetch_pending: false,
            observers: 0,
            stale_time: config.stale_time,
            retry: config.retry,
            unobserved_since: Some(Instant::now()),
        }
    }

    fn configure(&mut self, fetcher: Fetcher, options: &QueryOptions, config: &CacheConfig) {
        self.fetcher = Some(fetcher);
        self.stale_time = options.stale_time.unwrap_or(config.stale_time);
        self.retry = options.retry.unwrap_or(config.retry);
    }

    fn state(&self) -> QueryState {
        self.state.borrow().clone()
    }
}

struct Inner {
    config: CacheConfig,
    entries: Mutex<HashMap<QueryKey, Entry>>,
}

/// Shared handle to the query cache. Clones refer to the same entries.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

impl QueryCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Return the cached value for `key`, fetching it first when missing.
    ///
    /// Fresh data is returned as is. Stale data is returned immediately and a
    /// background refetch starts. A fetch failure is reported through the
    /// snapshot's status and error; the previous value, if any, is kept.
    pub async fn get_or_fetch<T, E, F, Fut>(
        &self,
        key: QueryKey,
        fetch: F,
        options: QueryOptions,
    ) -> QuerySnapshot<T>
    where
        T: Send + Sync + 'static,
        E: StdError + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let fetcher = erase_fetcher(fetch);
        let (pending, stale_time) = {
            let mut entries = mutex_lock(&self.inner.entries, SOURCE, "get_or_fetch");
            let entry = entry_for(&mut entries, &key, &self.inner.config);
            entry.configure(fetcher, &options, &self.inner.config);

            let state = entry.state();
            let resource = key.resource.as_str();
            let pending = if state.data.is_none() {
                counter!(MISS_TOTAL, "resource" => resource).increment(1);
                start_fetch(&self.inner, &key, entry)
            } else if state.is_stale(entry.stale_time) {
                counter!(STALE_HIT_TOTAL, "resource" => resource).increment(1);
                start_fetch(&self.inner, &key, entry);
                None
            } else {
                counter!(HIT_TOTAL, "resource" => resource).increment(1);
                None
            };
            (pending, entry.stale_time)
        };

        if let Some(pending) = pending {
            let _ = pending.await;
        }

        let entries = mutex_lock(&self.inner.entries, SOURCE, "get_or_fetch");
        let state = entries
            .get(&key)
            .map(Entry::state)
            .unwrap_or_default();
        QuerySnapshot::from_state(&state, stale_time)
    }

    /// Mount an observer on `key`.
    ///
    /// Registers the fetch function, fetches when the entry is missing or
    /// stale, and polls at `options.refetch_interval` until the observer is
    /// dropped. Must be called from within a tokio runtime.
    pub fn observe<T, E, F, Fut>(
        &self,
        key: QueryKey,
        fetch: F,
        options: QueryOptions,
    ) -> QueryObserver<T>
    where
        T: Send + Sync + 'static,
        E: StdError + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let fetcher = erase_fetcher(fetch);
        let (receiver, stale_time) = {
            let mut entries = mutex_lock(&self.inner.entries, SOURCE, "observe");
            let entry = entry_for(&mut entries, &key, &self.inner.config);
            entry.configure(fetcher, &options, &self.inner.config);
            entry.observers += 1;
            entry.unobserved_since = None;

            let receiver = entry.state.subscribe();
            let state = entry.state();
            if state.data.is_none() || state.is_stale(entry.stale_time) {
                start_fetch(&self.inner, &key, entry);
            }
            (receiver, entry.stale_time)
        };

        let poller = options
            .refetch_interval
            .filter(|interval| !interval.is_zero())
            .map(|interval| self.spawn_poller(key.clone(), interval));

        debug!(key = %key, polling = poller.is_some(), "Query observer mounted");

        QueryObserver {
            cache: self.clone(),
            key,
            receiver,
            stale_time,
            poller,
            _marker: PhantomData,
        }
    }

    /// Mark every matching entry stale and refetch the observed ones.
    ///
    /// Never blocks on a fetch. An entry with a fetch in flight gets exactly
    /// one follow-up fetch after the current one settles. Returns the number
    /// of entries matched.
    pub fn invalidate(&self, filter: impl Into<KeyFilter>) -> usize {
        let filter = filter.into();
        let mut entries = mutex_lock(&self.inner.entries, SOURCE, "invalidate");
        let mut matched = 0usize;

        for (key, entry) in entries.iter_mut() {
            if !filter.matches(key) {
                continue;
            }
            matched += 1;
            entry.state.send_modify(|state| {
                state.invalidated = true;
                state.invalidation_count += 1;
            });

            if entry.in_flight.is_some() {
                entry.refetch_pending = true;
            } else if entry.observers > 0 {
                start_fetch(&self.inner, key, entry);
            }
        }

        counter!(INVALIDATION_TOTAL).increment(matched as u64);
        debug!(filter = %filter, matched, "Query cache invalidated");
        matched
    }

    /// Start a fetch for `key` unless one is already running. Returns false
    /// when the key has no registered fetch function.
    pub fn refetch(&self, key: &QueryKey) -> bool {
        let mut entries = mutex_lock(&self.inner.entries, SOURCE, "refetch");
        match entries.get_mut(key) {
            Some(entry) => start_fetch(&self.inner, key, entry).is_some(),
            None => false,
        }
    }

    pub fn snapshot<T>(&self, key: &QueryKey) -> Option<QuerySnapshot<T>>
    where
        T: Send + Sync + 'static,
    {
        let entries = mutex_lock(&self.inner.entries, SOURCE, "snapshot");
        entries
            .get(key)
            .map(|entry| QuerySnapshot::from_state(&entry.state.borrow(), entry.stale_time))
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        mutex_lock(&self.inner.entries, SOURCE, "contains").contains_key(key)
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.inner.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove entries that have had no observer for at least `gc_time` and no fetch in flight.
    pub fn collect_garbage(&self) -> usize {
        let gc_time = self.inner.config.gc_time;
        let mut entries = mutex_lock(&self.inner.entries, SOURCE, "collect_garbage");
        let before = entries.len();

        entries.retain(|key, entry| {
            let expired = entry.observers == 0
                && entry.in_flight.is_none()
                && entry
                    .unobserved_since
                    .is_some_and(|since| since.elapsed() >= gc_time);
            if expired {
                trace!(key = %key, "Query entry collected");
            }
            !expired
        });

        let removed = before - entries.len();
        if removed > 0 {
            gauge!(ENTRIES).decrement(removed as f64);
            debug!(removed, remaining = entries.len(), "Query cache swept");
        }
        removed
    }

    /// Run [`collect_garbage`](Self::collect_garbage) every `gc_interval` until aborted.
    pub fn spawn_collector(&self) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.config.gc_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                QueryCache { inner }.collect_garbage();
            }
        })
    }

    pub(crate) fn release(&self, key: &QueryKey) {
        let mut entries = mutex_lock(&self.inner.entries, SOURCE, "release");
        if let Some(entry) = entries.get_mut(key) {
            entry.observers = entry.observers.saturating_sub(1);
            if entry.observers == 0 {
                entry.unobserved_since = Some(Instant::now());
            }
        }
    }

    fn spawn_poller(&self, key: QueryKey, interval: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                trace!(key = %key, "Polling refetch");
                QueryCache { inner }.refetch(&key);
            }
        })
    }
}

fn entry_for<'a>(
    entries: &'a mut HashMap<QueryKey, Entry>,
    key: &QueryKey,
    config: &CacheConfig,
) -> &'a mut Entry {
    match entries.entry(key.clone()) {
        MapEntry::Occupied(occupied) => occupied.into_mut(),
        MapEntry::Vacant(vacant) => {
            gauge!(ENTRIES).increment(1.0);
            vacant.insert(Entry::new(config))
        }
    }
}

fn erase_fetcher<T, E, F, Fut>(fetch: F) -> Fetcher
where
    T: Send + Sync + 'static,
    E: StdError + Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    Arc::new(move || {
        let pending = fetch();
        async move {
            pending
                .await
                .map(|data| Arc::new(data) as ErasedData)
                .map_err(QueryError::new)
        }
        .boxed()
    })
}

/// Join the in-flight fetch for `key` or start a new one. Caller holds the entries lock.
fn start_fetch(inner: &Arc<Inner>, key: &QueryKey, entry: &mut Entry) -> Option<SharedFetch> {
    if let Some(in_flight) = &entry.in_flight {
        counter!(FETCH_DEDUPED_TOTAL, "resource" => key.resource.as_str()).increment(1);
        return Some(in_flight.clone());
    }
    let fetcher = entry.fetcher.clone()?;

    let weak = Arc::downgrade(inner);
    let owned_key = key.clone();
    let config = inner.config.clone();
    let retries = entry.retry;
    let fetch = async move {
        let started = Instant::now();
        let result = fetch_with_retry(&fetcher, retries, &config, &owned_key).await;
        histogram!(FETCH_MS, "resource" => owned_key.resource.as_str())
            .record(started.elapsed().as_secs_f64() * 1000.0);
        if let Some(inner) = weak.upgrade() {
            settle(&inner, &owned_key, &result);
        }
        result
    }
    .boxed()
    .shared();

    counter!(FETCH_TOTAL, "resource" => key.resource.as_str()).increment(1);
    entry.in_flight = Some(fetch.clone());
    entry
        .state
        .send_modify(|state| state.status = QueryStatus::Fetching);
    trace!(key = %key, "Query fetch started");

    // Drive the fetch to completion even if every caller stops awaiting it.
    tokio::spawn(fetch.clone());
    Some(fetch)
}

async fn fetch_with_retry(
    fetcher: &Fetcher,
    retries: u32,
    config: &CacheConfig,
    key: &QueryKey,
) -> FetchResult {
    let mut attempt = 0;
    loop {
        match fetcher().await {
            Ok(data) => return Ok(data),
            Err(err) if attempt < retries => {
                let delay = config.retry_delay(attempt);
                debug!(
                    key = %key,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Query fetch failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn settle(inner: &Arc<Inner>, key: &QueryKey, result: &FetchResult) {
    let mut entries = mutex_lock(&inner.entries, SOURCE, "settle");
    let Some(entry) = entries.get_mut(key) else {
        return;
    };

    entry.in_flight = None;
    let follow_up = std::mem::take(&mut entry.refetch_pending);

    entry.state.send_modify(|state| match result {
        Ok(data) => {
            state.data = Some(Arc::clone(data));
            state.status = QueryStatus::Success;
            state.error = None;
            state.updated_at = Some(Instant::now());
            state.fetched_at = Some(OffsetDateTime::now_utc());
            state.invalidated = follow_up;
            state.fetch_count += 1;
        }
        Err(err) => {
            state.status = QueryStatus::Error;
            state.error = Some(err.clone());
        }
    });

    match result {
        Ok(_) => trace!(key = %key, "Query fetch settled"),
        Err(err) => {
            counter!(FETCH_ERROR_TOTAL, "resource" => key.resource.as_str()).increment(1);
            if entry.observers > 0 {
                warn!(key = %key, error = %err, "Query fetch failed");
            } else {
                debug!(key = %key, error = %err, "Query fetch failed without observers");
            }
        }
    }

    if follow_up && entry.observers > 0 {
        start_fetch(inner, key, entry);
    }
}
