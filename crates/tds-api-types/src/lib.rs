//! Wire types shared by the TDS admin client and its tests.
//!
//! Responses are validated at the HTTP boundary by deserializing into these
//! structs; push events are identified by [`EventName`] and carry an opaque
//! JSON payload.

mod alerts;
mod dashboard;
mod events;
mod queue;
mod sync;

pub use alerts::{Alert, AlertSeverity, AlertsQuery};
pub use dashboard::{
    CombinedStats, ComponentHealth, DashboardSummary, HealthState, HealthStatus, QueueDepth,
    SyncOverview,
};
pub use events::{EventName, ParseEventNameError, SocketEnvelope};
pub use queue::{
    AutoHealingStats, BreakerState, CircuitBreaker, DeadLetterItem, DeadLetterQuery, HealingRun,
    WebhookEvent, WebhooksQuery,
};
pub use sync::{SyncRun, SyncRunDetail, SyncRunStatus, SyncRunsQuery, SyncStep, TriggerSyncRequest};

use serde::{Deserialize, Serialize};

/// One page of a paginated collection endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub total: u64,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    20
}

/// Query-string pairs in the order they should be appended to a request URL.
pub type QueryPairs = Vec<(&'static str, String)>;

pub(crate) fn push_opt<T: ToString>(pairs: &mut QueryPairs, name: &'static str, value: Option<T>) {
    if let Some(value) = value {
        pairs.push((name, value.to_string()));
    }
}
