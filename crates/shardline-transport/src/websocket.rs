//! WebSocket gateway connection using tokio-tungstenite.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::traits::{Connector, GatewayConnection, Incoming, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Largest single message accepted from the gateway (64 MiB).
const MAX_MESSAGE_SIZE: usize = 64 << 20;

/// Opens gateway connections over TLS WebSockets.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    max_message_size: usize,
}

impl WebSocketConnector {
    #[must_use]
    pub fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(MAX_MESSAGE_SIZE)
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn GatewayConnection>, TransportError> {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(self.max_message_size);
        config.max_frame_size = Some(self.max_message_size);

        let (stream, response) = connect_async_with_config(url, Some(config), false)
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        debug!(status = %response.status(), "WebSocket handshake completed");
        Ok(Box::new(WebSocketConnection::new(stream)))
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

/// A gateway connection over a WebSocket.
///
/// The sink and the stream are locked separately so a heartbeat can be
/// sent while a read is pending.
pub struct WebSocketConnection {
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
    is_open: AtomicBool,
}

impl WebSocketConnection {
    fn new(stream: WsStream) -> Self {
        let (sink, stream) = stream.split();
        Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            is_open: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl GatewayConnection for WebSocketConnection {
    async fn recv(&self) -> Result<Option<Incoming>, TransportError> {
        let mut stream = self.stream.lock().await;

        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(Incoming::Binary(Bytes::from(data))));
                }
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(Incoming::Text(text)));
                }
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.map(|frame| u16::from(frame.code));
                    debug!(?code, "Received close frame");
                    self.is_open.store(false, Ordering::SeqCst);
                    return Ok(Some(Incoming::Close(code)));
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {
                    // Pongs are queued by tungstenite itself.
                }
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                    debug!("Connection closed");
                    self.is_open.store(false, Ordering::SeqCst);
                    return Ok(None);
                }
                Some(Err(e)) => {
                    warn!("WebSocket error: {}", e);
                    self.is_open.store(false, Ordering::SeqCst);
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
            }
        }
    }

    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::ConnectionClosed);
        }

        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(text)).await.map_err(|e| {
            if matches!(e, WsError::ConnectionClosed | WsError::AlreadyClosed) {
                self.is_open.store(false, Ordering::SeqCst);
                TransportError::ConnectionClosed
            } else {
                TransportError::SendFailed(e.to_string())
            }
        })
    }

    async fn close(&self, code: u16) -> Result<(), TransportError> {
        if !self.is_open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: "".into(),
        };
        let mut sink = self.sink.lock().await;
        match sink.send(Message::Close(Some(frame))).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::SendFailed(e.to_string())),
        }
    }

    fn is_open(&self) -> bool {
        self.is_open.load(Ordering::SeqCst)
    }
}
