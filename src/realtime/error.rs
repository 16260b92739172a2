use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Failures of the push transport. The channel absorbs these: it logs them
/// and reconnects, and never hands them to listeners.
#[derive(Debug, Error)]
pub enum SocketError {
    #[error("invalid socket request: {0}")]
    Request(String),
    #[error("socket connect failed: {0}")]
    Connect(#[source] Box<tungstenite::Error>),
    #[error("socket transport failed: {0}")]
    Transport(#[source] Box<tungstenite::Error>),
    #[error("socket closed: {0}")]
    Closed(String),
}

impl SocketError {
    pub fn closed(reason: impl Into<String>) -> Self {
        Self::Closed(reason.into())
    }
}
