use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{QueryPairs, push_opt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl SyncRunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncRunStatus::Pending => "pending",
            SyncRunStatus::Running => "running",
            SyncRunStatus::Completed => "completed",
            SyncRunStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: i64,
    pub source: String,
    pub status: SyncRunStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub finished_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub records_processed: u64,
    #[serde(default)]
    pub records_failed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStep {
    pub name: String,
    pub status: SyncRunStatus,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRunDetail {
    #[serde(flatten)]
    pub run: SyncRun,
    #[serde(default)]
    pub steps: Vec<SyncStep>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Filters for the paginated sync-run listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SyncRunsQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<SyncRunStatus>,
}

impl SyncRunsQuery {
    pub fn query_pairs(&self) -> QueryPairs {
        let mut pairs = QueryPairs::new();
        push_opt(&mut pairs, "page", self.page);
        push_opt(&mut pairs, "per_page", self.per_page);
        push_opt(&mut pairs, "status", self.status.map(SyncRunStatus::as_str));
        pairs
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TriggerSyncRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}
