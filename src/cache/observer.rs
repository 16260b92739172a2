use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use super::keys::QueryKey;
use super::query::{QueryCache, QueryError, QueryState, QueryStatus};

/// Typed view of one cache entry at a point in time.
pub struct QuerySnapshot<T> {
    pub data: Option<Arc<T>>,
    pub status: QueryStatus,
    pub error: Option<QueryError>,
    pub is_stale: bool,
    pub fetched_at: Option<OffsetDateTime>,
    /// Number of successful fetches so far.
    pub fetch_count: u64,
    pub invalidation_count: u64,
}

impl<T> QuerySnapshot<T>
where
    T: Send + Sync + 'static,
{
    pub(crate) fn from_state(state: &QueryState, stale_time: Duration) -> Self {
        Self {
            data: state
                .data
                .clone()
                .and_then(|data| data.downcast::<T>().ok()),
            status: state.status,
            error: state.error.clone(),
            is_stale: state.is_stale(stale_time),
            fetched_at: state.fetched_at,
            fetch_count: state.fetch_count,
            invalidation_count: state.invalidation_count,
        }
    }
}

impl<T> QuerySnapshot<T> {
    /// True while the first fetch is still running.
    pub fn is_loading(&self) -> bool {
        self.data.is_none() && self.status == QueryStatus::Fetching
    }
}

impl<T> Clone for QuerySnapshot<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            status: self.status,
            error: self.error.clone(),
            is_stale: self.is_stale,
            fetched_at: self.fetched_at,
            fetch_count: self.fetch_count,
            invalidation_count: self.invalidation_count,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for QuerySnapshot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySnapshot")
            .field("data", &self.data)
            .field("status", &self.status)
            .field("error", &self.error)
            .field("is_stale", &self.is_stale)
            .field("fetch_count", &self.fetch_count)
            .finish()
    }
}

/// A mounted subscription to one cache entry.
///
/// While alive it keeps the entry out of garbage collection and runs the
/// polling timer, if any. Dropping it stops the timer; a fetch already in
/// flight still completes and updates the cache.
pub struct QueryObserver<T> {
    pub(super) cache: QueryCache,
    pub(super) key: QueryKey,
    pub(super) receiver: watch::Receiver<QueryState>,
    pub(super) stale_time: Duration,
    pub(super) poller: Option<JoinHandle<()>>,
    pub(super) _marker: PhantomData<fn() -> T>,
}

impl<T> QueryObserver<T>
where
    T: Send + Sync + 'static,
{
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn snapshot(&self) -> QuerySnapshot<T> {
        QuerySnapshot::from_state(&self.receiver.borrow(), self.stale_time)
    }

    /// Wait for the entry to change. Returns `None` once the entry is gone.
    pub async fn changed(&mut self) -> Option<QuerySnapshot<T>> {
        self.receiver.changed().await.ok()?;
        let snapshot = QuerySnapshot::from_state(&self.receiver.borrow_and_update(), self.stale_time);
        Some(snapshot)
    }

    pub fn refetch(&self) -> bool {
        self.cache.refetch(&self.key)
    }
}

impl<T> Drop for QueryObserver<T> {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
        self.cache.release(&self.key);
        debug!(key = %self.key, "Query observer unmounted");
    }
}
