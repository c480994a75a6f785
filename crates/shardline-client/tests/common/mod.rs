//! In-memory gateway for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use shardline_client::{Client, ClientConfig};
use shardline_transport::{
    Connector, GatewayConnection, GatewayInfo, HttpBackend, HttpRequest, HttpResponse, Incoming,
    SessionStartLimit, TransportError,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

mod zlib {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    /// One zlib stream per connection; every frame ends in a sync flush.
    pub struct Compressor(ZlibEncoder<Vec<u8>>);

    impl Compressor {
        pub fn new() -> Self {
            Self(ZlibEncoder::new(Vec::new(), Compression::default()))
        }

        pub fn frame(&mut self, text: &str) -> Vec<u8> {
            self.0.write_all(text.as_bytes()).unwrap();
            self.0.flush().unwrap();
            std::mem::take(self.0.get_mut())
        }
    }
}

/// Client side of a mock connection.
pub struct MockConnection {
    incoming: Mutex<mpsc::UnboundedReceiver<Incoming>>,
    sent: mpsc::UnboundedSender<String>,
    closed: mpsc::UnboundedSender<u16>,
    open: AtomicBool,
}

#[async_trait]
impl GatewayConnection for MockConnection {
    async fn recv(&self) -> Result<Option<Incoming>, TransportError> {
        Ok(self.incoming.lock().await.recv().await)
    }

    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.sent
            .send(text)
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn close(&self, code: u16) -> Result<(), TransportError> {
        self.open.store(false, Ordering::Release);
        let _ = self.closed.send(code);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

/// Test side of a mock connection.
pub struct ServerSide {
    incoming: mpsc::UnboundedSender<Incoming>,
    sent: mpsc::UnboundedReceiver<String>,
    closed: mpsc::UnboundedReceiver<u16>,
    compressor: zlib::Compressor,
    pub url: String,
}

impl ServerSide {
    /// Send a JSON frame over the compressed stream.
    pub fn send(&mut self, frame: Value) {
        let chunk = self.compressor.frame(&frame.to_string());
        let _ = self.incoming.send(Incoming::Binary(chunk.into()));
    }

    /// Send a frame split into two socket messages.
    pub fn send_split(&mut self, frame: Value) {
        let chunk = self.compressor.frame(&frame.to_string());
        let (head, tail) = chunk.split_at(chunk.len() / 2);
        let _ = self.incoming.send(Incoming::Binary(head.to_vec().into()));
        let _ = self.incoming.send(Incoming::Binary(tail.to_vec().into()));
    }

    pub fn send_raw(&mut self, bytes: &[u8]) {
        let _ = self.incoming.send(Incoming::Binary(bytes.to_vec().into()));
    }

    pub fn send_close(&mut self, code: u16) {
        let _ = self.incoming.send(Incoming::Close(Some(code)));
    }

    pub fn hello(&mut self, interval_ms: u64) {
        self.send(json!({"op": 10, "d": {"heartbeat_interval": interval_ms}}));
    }

    pub fn dispatch(&mut self, name: &str, sequence: u64, data: Value) {
        self.send(json!({"op": 0, "s": sequence, "t": name, "d": data}));
    }

    /// Next frame the client sent.
    pub async fn next_sent(&mut self) -> Value {
        let text = tokio::time::timeout(Duration::from_secs(60), self.sent.recv())
            .await
            .expect("client sent nothing")
            .expect("connection dropped");
        serde_json::from_str(&text).unwrap()
    }

    /// Next frame the client sent with the given op code.
    pub async fn next_op(&mut self, op: u64) -> Value {
        loop {
            let frame = self.next_sent().await;
            if frame["op"] == op {
                return frame;
            }
        }
    }

    /// Everything sent so far without waiting.
    pub fn drain_sent(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(text) = self.sent.try_recv() {
            frames.push(serde_json::from_str(&text).unwrap());
        }
        frames
    }

    pub async fn closed_with(&mut self) -> u16 {
        tokio::time::timeout(Duration::from_secs(60), self.closed.recv())
            .await
            .expect("connection not closed")
            .expect("connection dropped")
    }
}

/// Hands out mock connections; the test accepts the server side.
pub struct MockConnector {
    accepted: mpsc::UnboundedSender<ServerSide>,
}

impl MockConnector {
    pub fn new() -> (Self, Gateway) {
        let (accepted, pending) = mpsc::unbounded_channel();
        (Self { accepted }, Gateway { pending })
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn GatewayConnection>, TransportError> {
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = mpsc::unbounded_channel();

        self.accepted
            .send(ServerSide {
                incoming: incoming_tx,
                sent: sent_rx,
                closed: closed_rx,
                compressor: zlib::Compressor::new(),
                url: url.to_string(),
            })
            .map_err(|_| TransportError::ConnectFailed("gateway gone".into()))?;

        Ok(Box::new(MockConnection {
            incoming: Mutex::new(incoming_rx),
            sent: sent_tx,
            closed: closed_tx,
            open: AtomicBool::new(true),
        }))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Accepts connections made by the client.
pub struct Gateway {
    pending: mpsc::UnboundedReceiver<ServerSide>,
}

impl Gateway {
    pub async fn accept(&mut self) -> ServerSide {
        tokio::time::timeout(Duration::from_secs(120), self.pending.recv())
            .await
            .expect("client did not connect")
            .expect("connector dropped")
    }
}

/// REST backend that must not be reached.
pub struct NoHttp;

#[async_trait]
impl HttpBackend for NoHttp {
    async fn execute(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
        Err(TransportError::Http("no HTTP in this test".into()))
    }
}

pub fn gateway_info(shards: u32) -> GatewayInfo {
    GatewayInfo {
        url: "wss://gateway.test".into(),
        shards,
        session_start_limit: SessionStartLimit {
            total: 1000,
            remaining: 1000,
            reset_after: 0,
            max_concurrency: 1,
        },
    }
}

/// A set up client over the mock gateway.
pub fn client(shards: u32) -> (Arc<Client>, Gateway) {
    let mut config = ClientConfig::default();
    config.token = None;
    config.shard_count = None;
    config.gateway.backoff_base_ms = 100;
    config.gateway.backoff_max_ms = 1_000;

    let (connector, gateway) = MockConnector::new();
    let client = Client::with_transport(config, Arc::new(NoHttp), Arc::new(connector));
    client.setup_with("secret", gateway_info(shards));
    (Arc::new(client), gateway)
}

pub fn ready_payload(session_id: &str, guild_ids: &[&str]) -> Value {
    json!({
        "v": 10,
        "session_id": session_id,
        "user": {"id": "100", "username": "shardline", "bot": true},
        "guilds": guild_ids
            .iter()
            .map(|id| json!({"id": id, "unavailable": true}))
            .collect::<Vec<_>>(),
    })
}

pub fn guild_payload(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "member_count": 2,
        "roles": [{"id": id, "name": "@everyone", "permissions": "1024"}],
        "channels": [{"id": format!("{id}1"), "type": 0, "name": "general"}],
        "members": [{"user": {"id": "100", "username": "shardline"}, "roles": []}],
    })
}
