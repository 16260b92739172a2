use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{QueryPairs, push_opt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub severity: AlertSeverity,
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub source: Option<String>,
    pub is_active: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub acknowledged_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Filters for the paginated alert listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct AlertsQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub severity: Option<AlertSeverity>,
    pub is_active: Option<bool>,
}

impl AlertsQuery {
    pub fn query_pairs(&self) -> QueryPairs {
        let mut pairs = QueryPairs::new();
        push_opt(&mut pairs, "page", self.page);
        push_opt(&mut pairs, "per_page", self.per_page);
        push_opt(&mut pairs, "severity", self.severity.map(AlertSeverity::as_str));
        push_opt(&mut pairs, "is_active", self.is_active);
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_parses_unacknowledged_alert() {
        let alert: Alert = serde_json::from_str(
            r#"{
                "id": 11,
                "severity": "critical",
                "title": "Queue backlog",
                "is_active": true,
                "created_at": "2024-05-01T10:00:00Z"
            }"#,
        )
        .expect("alert");
        assert_eq!(alert.severity, AlertSeverity::Critical);
        assert!(alert.acknowledged_at.is_none());
        assert!(alert.message.is_empty());
    }

    #[test]
    fn query_pairs_render_booleans() {
        let query = AlertsQuery {
            is_active: Some(true),
            severity: Some(AlertSeverity::Warning),
            ..Default::default()
        };
        assert_eq!(
            query.query_pairs(),
            vec![
                ("severity", "warning".to_string()),
                ("is_active", "true".to_string())
            ]
        );
    }
}
