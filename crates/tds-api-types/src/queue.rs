use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::{QueryPairs, push_opt};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterItem {
    pub id: i64,
    pub queue: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DeadLetterQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<String>,
}

impl DeadLetterQuery {
    pub fn query_pairs(&self) -> QueryPairs {
        let mut pairs = QueryPairs::new();
        push_opt(&mut pairs, "page", self.page);
        push_opt(&mut pairs, "per_page", self.per_page);
        push_opt(&mut pairs, "status", self.status.as_deref());
        pairs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreaker {
    pub name: String,
    pub state: BreakerState,
    #[serde(default)]
    pub failure_count: u32,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_failure_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub opened_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AutoHealingStats {
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub items_recovered: u64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_run_at: Option<OffsetDateTime>,
}

/// Result of a manually triggered healing pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealingRun {
    pub id: i64,
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(default)]
    pub items_recovered: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: i64,
    pub source: String,
    pub event_type: String,
    #[serde(default)]
    pub processed: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub received_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct WebhooksQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl WebhooksQuery {
    pub fn query_pairs(&self) -> QueryPairs {
        let mut pairs = QueryPairs::new();
        push_opt(&mut pairs, "page", self.page);
        push_opt(&mut pairs, "per_page", self.per_page);
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breaker_state_uses_snake_case() {
        let breaker: CircuitBreaker =
            serde_json::from_str(r#"{"name":"erp-api","state":"half_open","failure_count":3}"#)
                .expect("breaker");
        assert_eq!(breaker.state, BreakerState::HalfOpen);
        assert_eq!(breaker.failure_count, 3);
        assert!(breaker.opened_at.is_none());
    }

    #[test]
    fn dead_letter_query_includes_status() {
        let query = DeadLetterQuery {
            page: Some(1),
            per_page: Some(50),
            status: Some("pending".to_string()),
        };
        assert_eq!(
            query.query_pairs(),
            vec![
                ("page", "1".to_string()),
                ("per_page", "50".to_string()),
                ("status", "pending".to_string())
            ]
        );
    }
}
