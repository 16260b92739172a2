//! Data hooks: one binding per dashboard resource.
//!
//! Mounting a hook registers its fetch function with the query cache,
//! starts the resource's polling timer and subscribes to the push events
//! that make the resource stale. Each event invalidates the hook's own key
//! only. Dropping the hook undoes all three; a fetch already in flight still
//! lands in the cache.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tds_api_types::{
    Alert, AlertsQuery, AutoHealingStats, CircuitBreaker, CombinedStats, DashboardSummary,
    DeadLetterItem, DeadLetterQuery, EventName, HealthStatus, Page, SyncRun, SyncRunDetail,
    SyncRunStatus, SyncRunsQuery, WebhookEvent, WebhooksQuery,
};
use tracing::debug;

use crate::application::repos::{ApiError, TdsApi};
use crate::cache::{
    QueryCache, QueryKey, QueryObserver, QueryOptions, QueryParams, QuerySnapshot, Resource,
};
use crate::realtime::{SocketChannel, Subscription};

/// Polling period and invalidating events of one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookBinding {
    pub poll_interval: Duration,
    pub events: &'static [EventName],
}

impl HookBinding {
    const fn every(secs: u64, events: &'static [EventName]) -> Self {
        Self {
            poll_interval: Duration::from_secs(secs),
            events,
        }
    }

    pub fn for_resource(resource: Resource) -> Self {
        use EventName::{
            AlertCreated, CircuitBreakerStateChanged, HealthChanged, QueueUpdated, SyncCompleted,
            WebhookReceived,
        };

        match resource {
            Resource::DashboardSummary => Self::every(
                30,
                &[
                    QueueUpdated,
                    SyncCompleted,
                    AlertCreated,
                    HealthChanged,
                    CircuitBreakerStateChanged,
                ],
            ),
            Resource::Health => Self::every(15, &[HealthChanged, CircuitBreakerStateChanged]),
            Resource::SyncRuns | Resource::SyncRunDetail => Self::every(30, &[SyncCompleted]),
            Resource::CombinedStats => Self::every(60, &[QueueUpdated, SyncCompleted]),
            Resource::Alerts => Self::every(30, &[AlertCreated]),
            Resource::DeadLetter => Self::every(30, &[QueueUpdated]),
            Resource::CircuitBreakers => Self::every(15, &[CircuitBreakerStateChanged]),
            Resource::AutoHealingStats => Self::every(60, &[HealthChanged]),
            Resource::RecentWebhooks => Self::every(30, &[WebhookReceived]),
        }
    }
}

fn keyed(resource: Resource, params: QueryParams) -> QueryKey {
    if params.is_empty() {
        QueryKey::new(resource)
    } else {
        QueryKey::with_params(resource, params)
    }
}

pub fn sync_runs_key(query: &SyncRunsQuery) -> QueryKey {
    keyed(
        Resource::SyncRuns,
        QueryParams::new()
            .with_opt("page", query.page)
            .with_opt("per_page", query.per_page)
            .with_opt("status", query.status.map(SyncRunStatus::as_str)),
    )
}

pub fn sync_run_key(id: i64) -> QueryKey {
    QueryKey::with_params(Resource::SyncRunDetail, QueryParams::new().with("id", id))
}

pub fn alerts_key(query: &AlertsQuery) -> QueryKey {
    keyed(
        Resource::Alerts,
        QueryParams::new()
            .with_opt("page", query.page)
            .with_opt("per_page", query.per_page)
            .with_opt("severity", query.severity.map(|severity| severity.as_str()))
            .with_opt("is_active", query.is_active),
    )
}

pub fn dead_letter_key(query: &DeadLetterQuery) -> QueryKey {
    keyed(
        Resource::DeadLetter,
        QueryParams::new()
            .with_opt("page", query.page)
            .with_opt("per_page", query.per_page)
            .with_opt("status", query.status.clone()),
    )
}

pub fn webhooks_key(query: &WebhooksQuery) -> QueryKey {
    keyed(
        Resource::RecentWebhooks,
        QueryParams::new()
            .with_opt("page", query.page)
            .with_opt("per_page", query.per_page),
    )
}

/// A mounted hook. Drop it to unmount.
pub struct DataHook<T> {
    subscriptions: Vec<Subscription>,
    observer: QueryObserver<T>,
}

impl<T> DataHook<T>
where
    T: Send + Sync + 'static,
{
    pub fn key(&self) -> &QueryKey {
        self.observer.key()
    }

    pub fn snapshot(&self) -> QuerySnapshot<T> {
        self.observer.snapshot()
    }

    pub async fn changed(&mut self) -> Option<QuerySnapshot<T>> {
        self.observer.changed().await
    }

    pub fn refetch(&self) -> bool {
        self.observer.refetch()
    }

    pub fn subscribed_events(&self) -> Vec<EventName> {
        self.subscriptions
            .iter()
            .map(Subscription::event)
            .collect()
    }
}

/// Factory for every dashboard hook.
#[derive(Clone)]
pub struct DataHooks {
    api: Arc<dyn TdsApi>,
    cache: QueryCache,
    socket: SocketChannel,
}

impl DataHooks {
    pub fn new(api: Arc<dyn TdsApi>, cache: QueryCache, socket: SocketChannel) -> Self {
        Self { api, cache, socket }
    }

    fn mount<T, F, Fut>(&self, key: QueryKey, fetch: F) -> DataHook<T>
    where
        T: Send + Sync + 'static,
        F: Fn(Arc<dyn TdsApi>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let binding = HookBinding::for_resource(key.resource);
        let api = Arc::clone(&self.api);
        let observer = self.cache.observe(
            key.clone(),
            move || fetch(Arc::clone(&api)),
            QueryOptions::polling(binding.poll_interval),
        );

        let subscriptions = binding
            .events
            .iter()
            .map(|&event| {
                let cache = self.cache.clone();
                let key = key.clone();
                self.socket.on(event, move |_| {
                    debug!(event = %event, key = %key, "Push event invalidating query");
                    cache.invalidate(key.clone());
                })
            })
            .collect();

        DataHook {
            subscriptions,
            observer,
        }
    }

    pub fn dashboard_summary(&self) -> DataHook<DashboardSummary> {
        self.mount(QueryKey::new(Resource::DashboardSummary), |api| async move {
            api.dashboard_summary().await
        })
    }

    pub fn health(&self) -> DataHook<HealthStatus> {
        self.mount(QueryKey::new(Resource::Health), |api| async move {
            api.health().await
        })
    }

    pub fn sync_runs(&self, query: SyncRunsQuery) -> DataHook<Page<SyncRun>> {
        self.mount(sync_runs_key(&query), move |api| {
            let query = query.clone();
            async move { api.sync_runs(&query).await }
        })
    }

    pub fn sync_run(&self, id: i64) -> DataHook<SyncRunDetail> {
        self.mount(sync_run_key(id), move |api| async move {
            api.sync_run(id).await
        })
    }

    pub fn combined_stats(&self) -> DataHook<CombinedStats> {
        self.mount(QueryKey::new(Resource::CombinedStats), |api| async move {
            api.combined_stats().await
        })
    }

    pub fn alerts(&self, query: AlertsQuery) -> DataHook<Page<Alert>> {
        self.mount(alerts_key(&query), move |api| {
            let query = query.clone();
            async move { api.alerts(&query).await }
        })
    }

    pub fn dead_letter(&self, query: DeadLetterQuery) -> DataHook<Page<DeadLetterItem>> {
        self.mount(dead_letter_key(&query), move |api| {
            let query = query.clone();
            async move { api.dead_letter(&query).await }
        })
    }

    pub fn circuit_breakers(&self) -> DataHook<Vec<CircuitBreaker>> {
        self.mount(QueryKey::new(Resource::CircuitBreakers), |api| async move {
            api.circuit_breakers().await
        })
    }

    pub fn auto_healing_stats(&self) -> DataHook<AutoHealingStats> {
        self.mount(QueryKey::new(Resource::AutoHealingStats), |api| async move {
            api.auto_healing_stats().await
        })
    }

    pub fn recent_webhooks(&self, query: WebhooksQuery) -> DataHook<Page<WebhookEvent>> {
        self.mount(webhooks_key(&query), move |api| {
            let query = query.clone();
            async move { api.recent_webhooks(&query).await }
        })
    }
}
