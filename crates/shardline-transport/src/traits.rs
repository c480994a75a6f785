//! Gateway transport traits.
//!
//! The shard talks to the gateway only through these traits, so the
//! WebSocket implementation can be swapped for an in-memory one in tests.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Connection timed out.
    #[error("Connection timed out")]
    Timeout,

    /// Opening the connection failed.
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(String),
}

/// A message received from the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// A chunk of the compressed stream.
    Binary(Bytes),
    /// An uncompressed JSON frame.
    Text(String),
    /// The server closed the socket, with its close code if any.
    Close(Option<u16>),
}

/// An open gateway connection.
///
/// Methods take `&self` so one task can read while another sends
/// heartbeats.
#[async_trait]
pub trait GatewayConnection: Send + Sync {
    /// Receive the next message.
    ///
    /// Returns `None` once the stream ends without a close frame.
    async fn recv(&self) -> Result<Option<Incoming>, TransportError>;

    /// Send a text frame.
    async fn send_text(&self, text: String) -> Result<(), TransportError>;

    /// Close the connection with a close code.
    async fn close(&self, code: u16) -> Result<(), TransportError>;

    /// Check if the connection is still open.
    fn is_open(&self) -> bool;
}

/// Opens gateway connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to a gateway URL.
    async fn connect(&self, url: &str) -> Result<Box<dyn GatewayConnection>, TransportError>;

    /// Get the connector name (e.g., "websocket").
    fn name(&self) -> &'static str;
}
