use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, header::AUTHORIZATION};
use tracing::debug;
use url::Url;

use super::error::SocketError;

/// Text frames of one open connection. The stream ends when the peer closes.
pub type FrameStream = BoxStream<'static, Result<String, SocketError>>;

/// Opens push connections. Production uses [`WsConnector`].
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<FrameStream, SocketError>;
}

/// WebSocket connector that authenticates with a bearer token header.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: Url,
    token: Option<String>,
}

impl WsConnector {
    pub fn new(url: Url, token: Option<String>) -> Self {
        Self { url, token }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<FrameStream, SocketError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|err| SocketError::Request(err.to_string()))?;

        if let Some(token) = self.token.as_ref() {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|err| SocketError::Request(format!("invalid token header: {err}")))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (stream, response) = connect_async(request)
            .await
            .map_err(|err| SocketError::Connect(Box::new(err)))?;
        debug!(
            url = %self.url,
            status = response.status().as_u16(),
            "Socket handshake completed"
        );

        let frames = stream
            .take_while(|message| futures::future::ready(!matches!(message, Ok(Message::Close(_)))))
            .filter_map(|message| {
                futures::future::ready(match message {
                    Ok(Message::Text(text)) => Some(Ok(text.to_string())),
                    Ok(_) => None,
                    Err(err) => Some(Err(SocketError::Transport(Box::new(err)))),
                })
            })
            .boxed();

        Ok(frames)
    }
}
