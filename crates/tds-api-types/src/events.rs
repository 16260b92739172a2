use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Names of the server-push events the dashboard reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventName {
    QueueUpdated,
    HealthChanged,
    SyncCompleted,
    AlertCreated,
    CircuitBreakerStateChanged,
    WebhookReceived,
}

impl EventName {
    pub const ALL: [EventName; 6] = [
        EventName::QueueUpdated,
        EventName::HealthChanged,
        EventName::SyncCompleted,
        EventName::AlertCreated,
        EventName::CircuitBreakerStateChanged,
        EventName::WebhookReceived,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventName::QueueUpdated => "queue_updated",
            EventName::HealthChanged => "health_changed",
            EventName::SyncCompleted => "sync_completed",
            EventName::AlertCreated => "alert_created",
            EventName::CircuitBreakerStateChanged => "circuit_breaker_state_changed",
            EventName::WebhookReceived => "webhook_received",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEventNameError(pub String);

impl fmt::Display for ParseEventNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event name `{}`", self.0)
    }
}

impl std::error::Error for ParseEventNameError {}

impl FromStr for EventName {
    type Err = ParseEventNameError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        EventName::ALL
            .into_iter()
            .find(|name| name.as_str() == value)
            .ok_or_else(|| ParseEventNameError(value.to_string()))
    }
}

/// A single push frame as it travels over the socket.
///
/// The payload schema is owned by the backend and kept opaque here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketEnvelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}
