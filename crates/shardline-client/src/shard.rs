//! Gateway shard.
//!
//! A shard owns one gateway connection. The outer loop in [`Shard::run`]
//! (re)connects; the inner loop reads frames until the connection has to
//! be replaced, and reports how through [`Exit`]:
//!
//! ```text
//! Disconnected → Connecting → AwaitingHello → Identifying ┐
//!                                           → Resuming    ┴→ Active
//! ```
//!
//! Dispatches are forwarded to the [`DispatchRouter`] in wire order.

use crate::error::ShardError;
use crate::metrics::{self, ShardMetricsGuard};
use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use shardline_core::DispatchRouter;
use shardline_protocol::{
    CloseAction, CloseCode, Command, Envelope, FrameCodec, Hello, Identify, Intents, OpCode,
    Resume,
};
use shardline_transport::{Connector, GatewayConnection, Incoming, TransportError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Close code that keeps the session resumable.
const CLOSE_RESUMABLE: u16 = 4000;
const CLOSE_NORMAL: u16 = 1000;

/// Connection state of a shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardStatus {
    #[default]
    Disconnected,
    Connecting,
    AwaitingHello,
    Identifying,
    Resuming,
    Active,
    Closing,
    /// Stopped by a non-recoverable error.
    Fatal,
}

/// Reconnect timing.
#[derive(Debug, Clone)]
pub struct ShardOptions {
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub invalid_session_delay: Duration,
    pub connect_timeout: Duration,
}

impl Default for ShardOptions {
    fn default() -> Self {
        Self {
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
            invalid_session_delay: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Everything a shard needs from its client.
pub struct ShardContext {
    pub token: String,
    pub intents: Intents,
    pub shard_count: u32,
    /// Full gateway URL including version and compression query.
    pub gateway_url: String,
    pub connector: Arc<dyn Connector>,
    pub router: Arc<DispatchRouter>,
    pub options: ShardOptions,
}

/// Snapshot of a shard for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ShardInfo {
    pub id: u32,
    pub status: ShardStatus,
    pub latency_ms: Option<f64>,
    pub session_id: Option<String>,
    pub sequence: Option<u64>,
}

#[derive(Debug, Default)]
struct Session {
    status: ShardStatus,
    session_id: Option<String>,
    sequence: Option<u64>,
    heartbeat_interval: Option<Duration>,
    last_heartbeat: Option<Instant>,
    latency: Option<Duration>,
    /// Reconnects since the last READY or RESUMED.
    failures: u32,
}

/// Result of handling one frame.
enum Step {
    Continue,
    Exit(Exit),
}

/// Why a connection ended.
#[derive(Debug)]
enum Exit {
    /// The shard was closed.
    Stop,
    Reconnect {
        resume: bool,
        /// Fixed delay; the backoff applies when unset.
        delay: Option<Duration>,
    },
    Fatal(ShardError),
}

const RESUME: Exit = Exit::Reconnect {
    resume: true,
    delay: None,
};

const IDENTIFY: Exit = Exit::Reconnect {
    resume: false,
    delay: None,
};

/// One gateway connection.
pub struct Shard {
    id: u32,
    context: Arc<ShardContext>,
    session: Mutex<Session>,
    connection: Mutex<Option<Arc<dyn GatewayConnection>>>,
    identified: Notify,
    cancel: CancellationToken,
}

impl Shard {
    /// A disconnected shard. Nothing happens until [`Shard::run`].
    #[must_use]
    pub fn new(id: u32, context: Arc<ShardContext>) -> Self {
        Self {
            id,
            context,
            session: Mutex::new(Session::default()),
            connection: Mutex::new(None),
            identified: Notify::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Shard id within the configured shard count.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Current connection state.
    #[must_use]
    pub fn status(&self) -> ShardStatus {
        self.session.lock().status
    }

    /// Id of the session a reconnect would resume.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.session.lock().session_id.clone()
    }

    /// Sequence number of the last dispatch.
    #[must_use]
    pub fn sequence(&self) -> Option<u64> {
        self.session.lock().sequence
    }

    /// Time between the last heartbeat and its acknowledgement.
    #[must_use]
    pub fn latency(&self) -> Option<Duration> {
        self.session.lock().latency
    }

    /// Interval from the last HELLO.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.session.lock().heartbeat_interval
    }

    /// Whether [`Shard::close`] was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    #[must_use]
    pub fn info(&self) -> ShardInfo {
        let session = self.session.lock();
        ShardInfo {
            id: self.id,
            status: session.status,
            latency_ms: session.latency.map(|l| l.as_secs_f64() * 1000.0),
            session_id: session.session_id.clone(),
            sequence: session.sequence,
        }
    }

    /// Wait until the shard has received READY or RESUMED, or gave up on
    /// its first session.
    pub async fn wait_identified(&self) {
        let notified = self.identified.notified();
        if matches!(self.status(), ShardStatus::Active | ShardStatus::Fatal) {
            return;
        }
        notified.await;
    }

    /// Stop the shard: cancel the heartbeat, close the socket and forget
    /// the session.
    pub async fn close(&self) {
        let fatal = {
            let mut session = self.session.lock();
            let fatal = session.status == ShardStatus::Fatal;
            if !fatal {
                session.status = ShardStatus::Closing;
            }
            fatal
        };
        self.cancel.cancel();

        let connection = self.connection.lock().take();
        if let Some(connection) = connection {
            if let Err(e) = connection.close(CLOSE_NORMAL).await {
                debug!(shard = self.id, "Close failed: {}", e);
            }
        }

        let mut session = self.session.lock();
        *session = Session::default();
        if fatal {
            session.status = ShardStatus::Fatal;
        }
        info!(shard = self.id, "Shard closed");
    }

    /// Run the shard until it is closed or fails permanently.
    ///
    /// # Errors
    ///
    /// Returns the fatal condition that stopped the shard.
    pub async fn run(self: Arc<Self>) -> Result<(), ShardError> {
        let _metrics = ShardMetricsGuard::new();
        let mut codec = FrameCodec::new();
        let mut resume = false;
        let mut delay: Option<Duration> = None;

        info!(shard = self.id, "Shard starting");
        let result = loop {
            if let Some(delay) = delay.take() {
                debug!(shard = self.id, ?delay, "Waiting before reconnect");
                tokio::select! {
                    () = self.cancel.cancelled() => break Ok(()),
                    () = tokio::time::sleep(delay) => {}
                }
            }

            let connection = match self.connect().await {
                Some(Ok(connection)) => connection,
                Some(Err(e)) => {
                    warn!(shard = self.id, "Gateway connect failed: {}", e);
                    delay = Some(self.next_backoff());
                    continue;
                }
                None => break Ok(()),
            };

            codec.reset();
            match self.drive(&connection, &mut codec, resume).await {
                Exit::Stop => break Ok(()),
                Exit::Reconnect {
                    resume: wants_resume,
                    delay: fixed,
                } => {
                    resume = wants_resume && self.session.lock().session_id.is_some();
                    metrics::record_reconnect(if resume { "resume" } else { "identify" });
                    info!(shard = self.id, resume, "Reconnecting");
                    delay = Some(fixed.unwrap_or_else(|| self.next_backoff()));
                }
                Exit::Fatal(e) => {
                    error!(shard = self.id, "Shard stopped: {}", e);
                    metrics::record_fatal(self.id);
                    self.set_status(ShardStatus::Fatal);
                    self.identified.notify_waiters();
                    break Err(e);
                }
            }
        };

        if result.is_ok() {
            self.set_status(ShardStatus::Disconnected);
        }
        result
    }

    fn set_status(&self, status: ShardStatus) {
        self.session.lock().status = status;
    }

    fn next_backoff(&self) -> Duration {
        let failures = {
            let mut session = self.session.lock();
            let failures = session.failures;
            session.failures = failures.saturating_add(1);
            failures
        };
        let options = &self.context.options;
        backoff(options.backoff_base, options.backoff_max, failures)
    }

    /// Open a connection. `None` if the shard was closed meanwhile.
    async fn connect(&self) -> Option<Result<Arc<dyn GatewayConnection>, TransportError>> {
        if self.cancel.is_cancelled() {
            return None;
        }
        self.set_status(ShardStatus::Connecting);

        let url = &self.context.gateway_url;
        let timeout = self.context.options.connect_timeout;
        debug!(shard = self.id, url = %url, "Connecting to gateway");

        tokio::select! {
            () = self.cancel.cancelled() => None,
            result = tokio::time::timeout(timeout, self.context.connector.connect(url)) => {
                Some(match result {
                    Ok(Ok(connection)) => Ok(Arc::from(connection)),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(TransportError::Timeout),
                })
            }
        }
    }

    /// Read from one connection until it has to be replaced.
    async fn drive(
        self: &Arc<Self>,
        connection: &Arc<dyn GatewayConnection>,
        codec: &mut FrameCodec,
        resume: bool,
    ) -> Exit {
        *self.connection.lock() = Some(Arc::clone(connection));
        self.set_status(ShardStatus::AwaitingHello);
        let heartbeat = self.cancel.child_token();

        let exit = loop {
            let received = tokio::select! {
                () = self.cancel.cancelled() => break Exit::Stop,
                received = connection.recv() => received,
            };

            let step = match received {
                Ok(Some(Incoming::Binary(chunk))) => match codec.push(&chunk) {
                    Ok(Some(text)) => self.handle_frame(connection, &text, resume, &heartbeat).await,
                    Ok(None) => Step::Continue,
                    Err(e) => {
                        warn!(shard = self.id, "Corrupt compressed stream, starting over: {}", e);
                        Step::Exit(IDENTIFY)
                    }
                },
                Ok(Some(Incoming::Text(text))) => {
                    self.handle_frame(connection, &text, resume, &heartbeat).await
                }
                Ok(Some(Incoming::Close(code))) => Step::Exit(close_exit(self.id, code)),
                Ok(None) => {
                    info!(shard = self.id, "Gateway stream ended");
                    Step::Exit(RESUME)
                }
                Err(e) => {
                    warn!(shard = self.id, "Gateway receive failed: {}", e);
                    Step::Exit(RESUME)
                }
            };

            if let Step::Exit(exit) = step {
                break exit;
            }
        };

        heartbeat.cancel();
        self.connection.lock().take();

        let code = match exit {
            Exit::Reconnect { resume: true, .. } => CLOSE_RESUMABLE,
            _ => CLOSE_NORMAL,
        };
        if connection.is_open() {
            if let Err(e) = connection.close(code).await {
                debug!(shard = self.id, "Close failed: {}", e);
            }
        }
        exit
    }

    async fn handle_frame(
        self: &Arc<Self>,
        connection: &Arc<dyn GatewayConnection>,
        text: &str,
        resume: bool,
        heartbeat: &CancellationToken,
    ) -> Step {
        let envelope = match Envelope::from_json(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(shard = self.id, "Ignoring undecodable frame: {}", e);
                return Step::Continue;
            }
        };

        match envelope.op {
            OpCode::Hello => self.on_hello(connection, &envelope.d, resume, heartbeat).await,
            OpCode::Dispatch => {
                self.on_dispatch(envelope);
                Step::Continue
            }
            OpCode::Heartbeat => {
                debug!(shard = self.id, "Gateway requested a heartbeat");
                if let Err(e) = self.send_heartbeat(connection.as_ref()).await {
                    debug!(shard = self.id, "Heartbeat failed: {}", e);
                }
                Step::Continue
            }
            OpCode::HeartbeatAck => {
                self.on_heartbeat_ack();
                Step::Continue
            }
            OpCode::Reconnect => {
                info!(shard = self.id, "Gateway requested a reconnect");
                Step::Exit(RESUME)
            }
            OpCode::InvalidSession => Step::Exit(self.on_invalid_session(&envelope.d)),
            op => {
                debug!(shard = self.id, op = op.name(), "Ignoring unexpected op code");
                Step::Continue
            }
        }
    }

    async fn on_hello(
        self: &Arc<Self>,
        connection: &Arc<dyn GatewayConnection>,
        data: &Value,
        resume: bool,
        heartbeat: &CancellationToken,
    ) -> Step {
        let hello = match Hello::from_value(data) {
            Ok(hello) => hello,
            Err(e) => {
                warn!(shard = self.id, "Invalid HELLO: {}", e);
                return Step::Exit(Exit::Reconnect {
                    resume,
                    delay: None,
                });
            }
        };
        let interval = Duration::from_millis(hello.heartbeat_interval);

        let command = {
            let mut session = self.session.lock();
            session.heartbeat_interval = Some(interval);
            match session.session_id.clone().filter(|_| resume) {
                Some(session_id) => {
                    session.status = ShardStatus::Resuming;
                    Command::Resume(Resume {
                        session_id,
                        token: self.context.token.clone(),
                        seq: session.sequence,
                    })
                }
                None => {
                    session.session_id = None;
                    session.sequence = None;
                    session.latency = None;
                    session.last_heartbeat = None;
                    session.status = ShardStatus::Identifying;
                    Command::Identify(Identify::new(
                        self.context.token.clone(),
                        self.context.intents,
                        self.id,
                        self.context.shard_count,
                    ))
                }
            }
        };

        let kind = command.op().name();
        if let Err(e) = send(connection.as_ref(), &command).await {
            warn!(shard = self.id, "Failed to send {}: {}", kind, e);
            return Step::Exit(Exit::Reconnect {
                resume,
                delay: None,
            });
        }
        debug!(shard = self.id, "Sent {}", kind);

        self.spawn_heartbeat(Arc::clone(connection), interval, heartbeat.clone());
        Step::Continue
    }

    fn on_dispatch(&self, envelope: Envelope) {
        let name = envelope.t.unwrap_or_default();
        let established = {
            let mut session = self.session.lock();
            if let Some(sequence) = envelope.s {
                session.sequence = Some(sequence);
            }
            match name.as_str() {
                "READY" => {
                    session.session_id = envelope
                        .d
                        .get("session_id")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    session.status = ShardStatus::Active;
                    session.failures = 0;
                    info!(shard = self.id, session = ?session.session_id, "Session established");
                    true
                }
                "RESUMED" => {
                    session.status = ShardStatus::Active;
                    session.failures = 0;
                    info!(shard = self.id, session = ?session.session_id, "Session resumed");
                    true
                }
                _ => false,
            }
        };
        if established {
            self.identified.notify_waiters();
        }

        metrics::record_dispatch(&name);
        self.context.router.handle(self.id, &name, envelope.d);
    }

    fn on_heartbeat_ack(&self) {
        let mut session = self.session.lock();
        if let Some(sent) = session.last_heartbeat {
            let latency = sent.elapsed();
            session.latency = Some(latency);
            metrics::record_heartbeat_latency(latency);
            trace!(shard = self.id, ?latency, "Heartbeat acknowledged");
        }
    }

    fn on_invalid_session(&self, data: &Value) -> Exit {
        let resumable = data.as_bool().unwrap_or(false);
        let delay = Some(self.context.options.invalid_session_delay);

        if self.session.lock().session_id.is_none() {
            // Most likely an identify rate limit.
            info!(shard = self.id, "Session invalidated before it was established");
            self.identified.notify_waiters();
            self.context.router.barrier().cancel_shard(self.id);
            return Exit::Reconnect {
                resume: false,
                delay,
            };
        }

        info!(shard = self.id, resumable, "Session invalidated");
        if !resumable {
            self.context.router.barrier().cancel_shard(self.id);
        }
        Exit::Reconnect {
            resume: resumable,
            delay,
        }
    }

    async fn send_heartbeat(&self, connection: &dyn GatewayConnection) -> Result<(), TransportError> {
        let sequence = {
            let mut session = self.session.lock();
            session.last_heartbeat = Some(Instant::now());
            session.sequence
        };
        send(connection, &Command::heartbeat(sequence)).await?;
        trace!(shard = self.id, ?sequence, "Sent heartbeat");
        Ok(())
    }

    fn spawn_heartbeat(
        self: &Arc<Self>,
        connection: Arc<dyn GatewayConnection>,
        interval: Duration,
        token: CancellationToken,
    ) {
        let shard = Arc::clone(self);
        tokio::spawn(async move {
            debug!(shard = shard.id, ?interval, "Heartbeat task started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if let Err(e) = shard.send_heartbeat(connection.as_ref()).await {
                    debug!(shard = shard.id, "Heartbeat failed: {}", e);
                }
            }
            debug!(shard = shard.id, "Heartbeat task stopped");
        });
    }
}

impl std::fmt::Debug for Shard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shard")
            .field("id", &self.id)
            .field("session", &*self.session.lock())
            .finish()
    }
}

async fn send(connection: &dyn GatewayConnection, command: &Command) -> Result<(), TransportError> {
    let text = command
        .to_json()
        .map_err(|e| TransportError::SendFailed(e.to_string()))?;
    connection.send_text(text).await
}

/// How to continue after the gateway closed the socket.
fn close_exit(shard: u32, code: Option<u16>) -> Exit {
    let Some(close) = code.and_then(CloseCode::from_u16) else {
        info!(shard, ?code, "Gateway closed the connection");
        return RESUME;
    };

    match close.action() {
        CloseAction::Resume => {
            info!(shard, %close, "Gateway closed the connection");
            RESUME
        }
        CloseAction::Identify => {
            info!(shard, %close, "Gateway closed the connection, session lost");
            IDENTIFY
        }
        CloseAction::Fatal => Exit::Fatal(ShardError::from_close(shard, close)),
    }
}

/// Exponential backoff with full jitter between `base` and the capped
/// exponential ceiling.
fn backoff(base: Duration, max: Duration, attempt: u32) -> Duration {
    let ceiling = base
        .saturating_mul(1 << attempt.min(16))
        .min(max)
        .max(base);
    if ceiling == base {
        return base;
    }

    let low = base.as_millis() as u64;
    let high = ceiling.as_millis() as u64;
    Duration::from_millis(rand::thread_rng().gen_range(low..=high))
}
