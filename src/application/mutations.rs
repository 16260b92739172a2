//! Write operations and the cache entries they make stale.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tds_api_types::{Alert, CircuitBreaker, HealingRun, SyncRun, TriggerSyncRequest};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::application::repos::{ApiError, TdsApi};
use crate::cache::{QueryCache, Resource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    AcknowledgeAlert,
    ResetCircuitBreaker,
    TriggerHealing,
    TriggerSync,
}

impl MutationKind {
    pub const ALL: [MutationKind; 4] = [
        MutationKind::AcknowledgeAlert,
        MutationKind::ResetCircuitBreaker,
        MutationKind::TriggerHealing,
        MutationKind::TriggerSync,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MutationKind::AcknowledgeAlert => "acknowledge_alert",
            MutationKind::ResetCircuitBreaker => "reset_circuit_breaker",
            MutationKind::TriggerHealing => "trigger_healing",
            MutationKind::TriggerSync => "trigger_sync",
        }
    }

    /// Resources refreshed after a successful call. Every parameter
    /// variant of each resource is invalidated.
    pub fn invalidates(self) -> &'static [Resource] {
        match self {
            MutationKind::AcknowledgeAlert => &[Resource::Alerts, Resource::DashboardSummary],
            MutationKind::ResetCircuitBreaker => &[
                Resource::CircuitBreakers,
                Resource::Health,
                Resource::DashboardSummary,
            ],
            MutationKind::TriggerHealing => &[
                Resource::AutoHealingStats,
                Resource::DeadLetter,
                Resource::DashboardSummary,
            ],
            MutationKind::TriggerSync => &[
                Resource::SyncRuns,
                Resource::CombinedStats,
                Resource::DashboardSummary,
            ],
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of the latest call of one mutation kind.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MutationState {
    #[default]
    Idle,
    Pending,
    Success,
    Error(String),
}

impl MutationState {
    pub fn is_pending(&self) -> bool {
        matches!(self, MutationState::Pending)
    }
}

#[derive(Debug, Error)]
pub enum MutationError {
    #[error("{kind} failed")]
    Api {
        kind: MutationKind,
        #[source]
        source: ApiError,
    },
}

impl MutationError {
    pub fn kind(&self) -> MutationKind {
        match self {
            MutationError::Api { kind, .. } => *kind,
        }
    }

    pub fn api_error(&self) -> &ApiError {
        match self {
            MutationError::Api { source, .. } => source,
        }
    }
}

/// Runs write calls and invalidates the affected queries on success.
///
/// A failed call leaves the cache untouched. Concurrent calls of the same
/// kind are not serialized; the state reflects whichever settled last.
#[derive(Clone)]
pub struct MutationDispatcher {
    api: Arc<dyn TdsApi>,
    cache: QueryCache,
    states: Arc<HashMap<MutationKind, watch::Sender<MutationState>>>,
}

impl MutationDispatcher {
    pub fn new(api: Arc<dyn TdsApi>, cache: QueryCache) -> Self {
        let states = MutationKind::ALL
            .into_iter()
            .map(|kind| (kind, watch::channel(MutationState::Idle).0))
            .collect();
        Self {
            api,
            cache,
            states: Arc::new(states),
        }
    }

    pub fn state(&self, kind: MutationKind) -> MutationState {
        self.states
            .get(&kind)
            .map(|sender| sender.borrow().clone())
            .unwrap_or_default()
    }

    pub fn watch(&self, kind: MutationKind) -> Option<watch::Receiver<MutationState>> {
        self.states.get(&kind).map(watch::Sender::subscribe)
    }

    fn set_state(&self, kind: MutationKind, state: MutationState) {
        if let Some(sender) = self.states.get(&kind) {
            sender.send_replace(state);
        }
    }

    async fn run<T, Fut>(&self, kind: MutationKind, call: Fut) -> Result<T, MutationError>
    where
        Fut: Future<Output = Result<T, ApiError>>,
    {
        self.set_state(kind, MutationState::Pending);

        match call.await {
            Ok(value) => {
                let invalidated: usize = kind
                    .invalidates()
                    .iter()
                    .map(|&resource| self.cache.invalidate(resource))
                    .sum();
                self.set_state(kind, MutationState::Success);
                info!(mutation = %kind, invalidated, "Mutation succeeded");
                Ok(value)
            }
            Err(source) => {
                warn!(mutation = %kind, error = %source, "Mutation failed");
                self.set_state(kind, MutationState::Error(source.to_string()));
                Err(MutationError::Api { kind, source })
            }
        }
    }

    pub async fn acknowledge_alert(&self, id: i64) -> Result<Alert, MutationError> {
        self.run(MutationKind::AcknowledgeAlert, self.api.acknowledge_alert(id))
            .await
    }

    pub async fn reset_circuit_breaker(&self, name: &str) -> Result<CircuitBreaker, MutationError> {
        self.run(
            MutationKind::ResetCircuitBreaker,
            self.api.reset_circuit_breaker(name),
        )
        .await
    }

    pub async fn trigger_healing(&self) -> Result<HealingRun, MutationError> {
        self.run(MutationKind::TriggerHealing, self.api.trigger_healing())
            .await
    }

    pub async fn trigger_sync(&self, source: Option<String>) -> Result<SyncRun, MutationError> {
        let request = TriggerSyncRequest { source };
        self.run(MutationKind::TriggerSync, self.api.trigger_sync(&request))
            .await
    }
}
