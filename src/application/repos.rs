//! The REST surface the dashboard depends on.

use async_trait::async_trait;
use tds_api_types::{
    Alert, AlertsQuery, AutoHealingStats, CircuitBreaker, CombinedStats, DashboardSummary,
    DeadLetterItem, DeadLetterQuery, HealingRun, HealthStatus, Page, SyncRun, SyncRunDetail,
    SyncRunsQuery, TriggerSyncRequest, WebhookEvent, WebhooksQuery,
};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("invalid URL: {0}")]
    Url(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("server responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("invalid header value: {0}")]
    InvalidHeader(String),
}

impl ApiError {
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Typed access to the TDS admin endpoints.
#[async_trait]
pub trait TdsApi: Send + Sync {
    async fn dashboard_summary(&self) -> Result<DashboardSummary, ApiError>;

    async fn health(&self) -> Result<HealthStatus, ApiError>;

    async fn sync_runs(&self, query: &SyncRunsQuery) -> Result<Page<SyncRun>, ApiError>;

    async fn sync_run(&self, id: i64) -> Result<SyncRunDetail, ApiError>;

    async fn combined_stats(&self) -> Result<CombinedStats, ApiError>;

    async fn alerts(&self, query: &AlertsQuery) -> Result<Page<Alert>, ApiError>;

    async fn acknowledge_alert(&self, id: i64) -> Result<Alert, ApiError>;

    async fn dead_letter(&self, query: &DeadLetterQuery)
    -> Result<Page<DeadLetterItem>, ApiError>;

    async fn circuit_breakers(&self) -> Result<Vec<CircuitBreaker>, ApiError>;

    async fn reset_circuit_breaker(&self, name: &str) -> Result<CircuitBreaker, ApiError>;

    async fn auto_healing_stats(&self) -> Result<AutoHealingStats, ApiError>;

    async fn trigger_healing(&self) -> Result<HealingRun, ApiError>;

    async fn trigger_sync(&self, request: &TriggerSyncRequest) -> Result<SyncRun, ApiError>;

    async fn recent_webhooks(&self, query: &WebhooksQuery)
    -> Result<Page<WebhookEvent>, ApiError>;
}
