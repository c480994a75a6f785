//! Client: owns the shards and the state they share.

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::shard::{Shard, ShardContext, ShardOptions};
use parking_lot::RwLock;
use shardline_core::id::marker::{GuildMarker, UserMarker};
use shardline_core::model::{Guild, User};
use shardline_core::{
    Cache, DispatchRouter, Event, EventBus, EventKind, Id, RouterConfig,
};
use shardline_protocol::API_VERSION;
use shardline_transport::{
    Connector, GatewayInfo, HttpBackend, ReqwestBackend, RestClient, RestConfig,
    WebSocketConnector,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Pause between identify batches.
const BATCH_INTERVAL: Duration = Duration::from_secs(5);

/// A sharded gateway client.
///
/// ```rust,ignore
/// let client = Client::new(ClientConfig::load()?);
/// client.on(EventKind::MessageCreate, |event| async move {
///     println!("{event:?}");
/// });
/// client.setup(token).await?;
/// client.launch().await?;
/// ```
pub struct Client {
    config: ClientConfig,
    rest: Arc<RestClient>,
    cache: Arc<Cache>,
    bus: Arc<EventBus>,
    router: Arc<DispatchRouter>,
    connector: Arc<dyn Connector>,
    gateway: RwLock<Option<GatewayInfo>>,
    shards: RwLock<Vec<Arc<Shard>>>,
}

impl Client {
    /// Create a client using reqwest and WebSocket transports.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(
            config,
            Arc::new(ReqwestBackend::default()),
            Arc::new(WebSocketConnector::default()),
        )
    }

    /// Create a client over custom HTTP and gateway transports.
    #[must_use]
    pub fn with_transport(
        config: ClientConfig,
        backend: Arc<dyn HttpBackend>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let rest = Arc::new(RestClient::new(
            backend,
            config.token.clone(),
            RestConfig {
                max_retries: config.max_retries,
                ..RestConfig::default()
            },
        ));
        let cache = Arc::new(Cache::with_config(config.cache.clone()));
        let bus = Arc::new(EventBus::new());
        let router = Arc::new(DispatchRouter::new(
            Arc::clone(&cache),
            Arc::clone(&bus),
            RouterConfig {
                debug_events: config.debug_events,
                ready_timeout: config.ready_timeout(),
            },
        ));

        Self {
            config,
            rest,
            cache,
            bus,
            router,
            connector,
            gateway: RwLock::new(None),
            shards: RwLock::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    #[must_use]
    pub fn rest(&self) -> &Arc<RestClient> {
        &self.rest
    }

    #[must_use]
    pub fn router(&self) -> &Arc<DispatchRouter> {
        &self.router
    }

    /// Set the token and fetch gateway information.
    ///
    /// # Errors
    ///
    /// Returns an error if `GET /gateway/bot` fails.
    pub async fn setup(&self, token: impl Into<String>) -> Result<(), ClientError> {
        let token = token.into();
        self.rest.set_token(Some(token.clone()));
        let info = self.rest.get_gateway_bot().await?;
        self.setup_with(token, info);
        Ok(())
    }

    /// Set the token and create shards from already fetched gateway
    /// information.
    pub fn setup_with(&self, token: impl Into<String>, info: GatewayInfo) {
        let token = token.into();
        self.rest.set_token(Some(token.clone()));

        let shard_count = self.config.shard_count.unwrap_or(info.shards).max(1);
        let gateway = &self.config.gateway;
        let context = Arc::new(ShardContext {
            token,
            intents: self.config.intents,
            shard_count,
            gateway_url: API_VERSION.gateway_url(&info.url),
            connector: Arc::clone(&self.connector),
            router: Arc::clone(&self.router),
            options: ShardOptions {
                backoff_base: Duration::from_millis(gateway.backoff_base_ms),
                backoff_max: Duration::from_millis(gateway.backoff_max_ms),
                invalid_session_delay: Duration::from_millis(gateway.invalid_session_delay_ms),
                connect_timeout: self.config.connect_timeout(),
            },
        });

        let shards = (0..shard_count)
            .map(|id| Arc::new(Shard::new(id, Arc::clone(&context))))
            .collect();
        info!(shard_count, url = %info.url, "Client set up");

        *self.shards.write() = shards;
        *self.gateway.write() = Some(info);
    }

    /// Start every shard and run until the client is closed.
    ///
    /// Shards identify in batches of the gateway's `max_concurrency`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::SetupRequired`] before `setup`, or the first
    /// fatal shard error. A fatal error closes the whole client.
    pub async fn launch(&self) -> Result<(), ClientError> {
        let shards = self.shards();
        if shards.is_empty() {
            return Err(ClientError::SetupRequired);
        }

        let concurrency = self
            .gateway
            .read()
            .as_ref()
            .map_or(1, |info| info.session_start_limit.max_concurrency)
            .max(1) as usize;
        let batches = shards.len().div_ceil(concurrency);

        let mut tasks = JoinSet::new();
        for (index, batch) in shards.chunks(concurrency).enumerate() {
            for shard in batch {
                tasks.spawn(Arc::clone(shard).run());
            }
            for shard in batch {
                let identified =
                    tokio::time::timeout(self.config.connect_timeout(), shard.wait_identified());
                if identified.await.is_err() {
                    warn!(shard = shard.id(), "Shard did not identify in time");
                }
            }
            if index + 1 < batches {
                tokio::time::sleep(BATCH_INTERVAL).await;
            }
        }

        self.router.barrier().notify_shards_connected();
        info!(shards = shards.len(), "All shards launched");

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    self.close().await;
                    return Err(e.into());
                }
                Err(e) => error!("Shard task failed: {}", e),
            }
        }
        Ok(())
    }

    /// Stop all shards and drop cached state.
    pub async fn close(&self) {
        for shard in self.shards() {
            shard.close().await;
        }
        self.router.reset();
        self.rest.limiter().clear();
        self.cache.clear();
        info!("Client closed");
    }

    #[must_use]
    pub fn shards(&self) -> Vec<Arc<Shard>> {
        self.shards.read().clone()
    }

    #[must_use]
    pub fn shard(&self, id: u32) -> Option<Arc<Shard>> {
        self.shards.read().get(id as usize).cloned()
    }

    /// Average heartbeat latency over shards that have one.
    #[must_use]
    pub fn latency(&self) -> Option<Duration> {
        let latencies: Vec<Duration> = self.shards().iter().filter_map(|s| s.latency()).collect();
        let count = u32::try_from(latencies.len()).ok().filter(|n| *n > 0)?;
        Some(latencies.iter().sum::<Duration>() / count)
    }

    /// Register a callback for an event kind.
    pub fn on<F, Fut>(&self, kind: EventKind, callback: F)
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.bus.register(kind, callback);
    }

    /// Receive every event.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Event>> {
        self.bus.subscribe()
    }

    /// Whether the client-wide ready event has fired.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.router.barrier().is_ready()
    }

    pub async fn wait_until_ready(&self) {
        self.router.barrier().wait_until_ready().await;
    }

    /// Fetch a user over REST.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the payload is invalid.
    pub async fn fetch_user(&self, id: Id<UserMarker>) -> Result<User, ClientError> {
        let data = self.rest.get_user(id.get()).await?;
        Ok(serde_json::from_value(data)?)
    }

    /// Fetch a guild over REST, with approximate member counts.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the payload is invalid.
    pub async fn fetch_guild(&self, id: Id<GuildMarker>) -> Result<Guild, ClientError> {
        let data = self.rest.get_guild(id.get(), true).await?;
        Ok(serde_json::from_value(data)?)
    }

    /// Leave a guild.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn leave_guild(&self, id: Id<GuildMarker>) -> Result<(), ClientError> {
        Ok(self.rest.leave_guild(id.get()).await?)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("shards", &self.shards.read().len())
            .field("ready", &self.is_ready())
            .field("rest", &self.rest)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use shardline_transport::{
        GatewayConnection, HttpRequest, HttpResponse, SessionStartLimit, TransportError,
    };

    struct Unreachable;

    #[async_trait]
    impl Connector for Unreachable {
        async fn connect(&self, _url: &str) -> Result<Box<dyn GatewayConnection>, TransportError> {
            Err(TransportError::ConnectFailed("unreachable".into()))
        }

        fn name(&self) -> &'static str {
            "unreachable"
        }
    }

    /// Answers every request with the same JSON body.
    struct Fixed(serde_json::Value);

    #[async_trait]
    impl HttpBackend for Fixed {
        async fn execute(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            Ok(HttpResponse {
                status: 200,
                headers: Default::default(),
                body: self.0.to_string().into(),
            })
        }
    }

    fn client(body: serde_json::Value, shard_count: Option<u32>) -> Client {
        let config = ClientConfig {
            token: None,
            shard_count,
            ..ClientConfig::default()
        };
        Client::with_transport(config, Arc::new(Fixed(body)), Arc::new(Unreachable))
    }

    fn gateway(shards: u32) -> GatewayInfo {
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

    #[tokio::test]
    async fn test_launch_requires_setup() {
        let client = client(json!({}), None);
        assert!(matches!(client.launch().await, Err(ClientError::SetupRequired)));
    }

    #[tokio::test]
    async fn test_setup_fetches_gateway() {
        let client = client(serde_json::to_value(gateway(3)).unwrap(), None);
        client.setup("token").await.unwrap();

        assert_eq!(client.shards().len(), 3);
        assert_eq!(client.shard(2).unwrap().id(), 2);
        assert!(client.shard(3).is_none());
        assert!(client.rest().has_token());
    }

    #[test]
    fn test_configured_shard_count_wins() {
        let client = client(json!({}), Some(2));
        client.setup_with("token", gateway(5));
        assert_eq!(client.shards().len(), 2);
        assert!(client.latency().is_none());
    }

    #[tokio::test]
    async fn test_fetch_user() {
        let client = client(json!({"id": "80351110224678912", "username": "Nelly"}), None);
        client.rest().set_token(Some("token".into()));

        let user = client.fetch_user(Id::new(80_351_110_224_678_912)).await.unwrap();
        assert_eq!(user.username, "Nelly");
    }
}
