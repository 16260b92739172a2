//! Socket channel.
//!
//! Holds the single server-push connection of the process and fans named
//! events out to registered listeners. Frames are JSON envelopes of the form
//! `{"event": "<name>", "data": <any>}`; anything else is dropped.

mod backoff;
mod channel;
mod connector;
mod error;
pub mod metrics;

pub use backoff::ReconnectPolicy;
pub use channel::{ConnectionState, SocketChannel, SocketEvent, Subscription};
pub use connector::{Connector, FrameStream, WsConnector};
pub use error::SocketError;
