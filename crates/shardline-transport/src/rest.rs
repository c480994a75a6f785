//! Rate-limited REST client.
//!
//! Every request takes its route's bucket lock for the duration of the
//! attempt. Responses teach the limiter bucket hashes, exhausted buckets
//! stay locked until they reset, and 429 responses are retried after the
//! server's delay, tripping the global gate when the limit is global.

use crate::ratelimit::RateLimiter;
use crate::traits::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shardline_protocol::API_VERSION;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Upper bound for attempts per request.
pub const MAX_RETRIES: u8 = 5;

/// Longest wait accepted from a rate limit response.
const MAX_SERVER_DELAY: Duration = Duration::from_secs(3600);

/// REST errors surfaced to callers.
#[derive(Debug, Error)]
pub enum RestError {
    /// An authenticated route was called before a token was configured.
    #[error("No token configured, the client is not set up")]
    SetupRequired,

    #[error("400 Bad Request: {body}")]
    BadRequest { body: String },

    #[error("403 Forbidden: {body}")]
    Forbidden { body: String },

    #[error("404 Not Found: {body}")]
    NotFound { body: String },

    #[error("{status} Server Error: {body}")]
    ServerError { status: u16, body: String },

    /// Any other unsuccessful status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Gave up on {route} after {attempts} attempts")]
    RetriesExhausted { route: String, attempts: u8 },

    #[error("Invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// An API route: method plus path template, with its parameters.
#[derive(Debug, Clone)]
pub struct Route {
    method: Method,
    template: &'static str,
    params: Vec<(&'static str, String)>,
    auth: bool,
}

impl Route {
    #[must_use]
    pub fn new(method: Method, template: &'static str) -> Self {
        Self {
            method,
            template,
            params: Vec::new(),
            auth: true,
        }
    }

    /// Fill a `{name}` placeholder of the template.
    #[must_use]
    pub fn param(mut self, name: &'static str, value: impl fmt::Display) -> Self {
        self.params.push((name, value.to_string()));
        self
    }

    /// Send without the `Authorization` header.
    #[must_use]
    pub fn unauthenticated(mut self) -> Self {
        self.auth = false;
        self
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn requires_auth(&self) -> bool {
        self.auth
    }

    /// Rate limit key: method and template, never the filled-in path.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{} {}", self.method, self.template)
    }

    #[must_use]
    pub fn path(&self) -> String {
        self.params
            .iter()
            .fold(self.template.to_string(), |path, (name, value)| {
                path.replace(&format!("{{{name}}}"), value)
            })
    }
}

/// A request ready for the HTTP backend.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

/// A response from the HTTP backend. Header names are lowercase.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Executes HTTP requests.
#[async_trait]
pub trait HttpBackend: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// [`HttpBackend`] on top of reqwest.
#[derive(Debug, Clone, Default)]
pub struct ReqwestBackend {
    client: reqwest::Client,
}

impl ReqwestBackend {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpBackend for ReqwestBackend {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self.client.request(request.method, &request.url);
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_ascii_lowercase(), value.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// REST client configuration.
#[derive(Debug, Clone)]
pub struct RestConfig {
    pub base_url: String,
    /// Attempts per request, clamped to `1..=5`.
    pub max_retries: u8,
    pub user_agent: String,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            base_url: API_VERSION.rest_base(),
            max_retries: MAX_RETRIES,
            user_agent: format!(
                "DiscordBot (https://github.com/shardline/shardline, {})",
                env!("CARGO_PKG_VERSION")
            ),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RateLimitBody {
    #[serde(default)]
    retry_after: f64,
    #[serde(default)]
    global: bool,
}

/// `session_start_limit` of the bot gateway endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStartLimit {
    pub total: u32,
    pub remaining: u32,
    pub reset_after: u64,
    pub max_concurrency: u32,
}

/// Response of `GET /gateway/bot`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayInfo {
    pub url: String,
    pub shards: u32,
    pub session_start_limit: SessionStartLimit,
}

/// REST API client.
pub struct RestClient {
    backend: Arc<dyn HttpBackend>,
    limiter: Arc<RateLimiter>,
    token: RwLock<Option<String>>,
    config: RestConfig,
}

impl RestClient {
    #[must_use]
    pub fn new(backend: Arc<dyn HttpBackend>, token: Option<String>, config: RestConfig) -> Self {
        Self {
            backend,
            limiter: Arc::new(RateLimiter::new()),
            token: RwLock::new(token),
            config,
        }
    }

    /// A client over reqwest with default settings.
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        Self::new(
            Arc::new(ReqwestBackend::default()),
            Some(token.into()),
            RestConfig::default(),
        )
    }

    /// Replace the bot token used for authenticated routes.
    pub fn set_token(&self, token: Option<String>) {
        *self.token.write() = token;
    }

    #[must_use]
    pub fn has_token(&self) -> bool {
        self.token.read().is_some()
    }

    #[must_use]
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    fn attempts(&self) -> u8 {
        self.config.max_retries.clamp(1, MAX_RETRIES)
    }

    fn build(
        &self,
        route: &Route,
        query: &[(String, String)],
        body: Option<&Value>,
        reason: Option<&str>,
    ) -> Result<HttpRequest, RestError> {
        let mut headers = vec![("User-Agent", self.config.user_agent.clone())];
        if route.requires_auth() {
            let token = self.token.read();
            let token = token.as_deref().ok_or(RestError::SetupRequired)?;
            headers.push(("Authorization", format!("Bot {token}")));
        }
        if let Some(reason) = reason {
            headers.push(("X-Audit-Log-Reason", reason.to_string()));
        }

        Ok(HttpRequest {
            method: route.method().clone(),
            url: format!("{}{}", self.config.base_url, route.path()),
            headers,
            query: query.to_vec(),
            body: body.cloned(),
        })
    }

    /// Perform a request.
    ///
    /// Returns `None` for empty (204) responses.
    ///
    /// # Errors
    ///
    /// Returns a typed error for 400, 403, 404 and 5xx responses, when
    /// retries run out, or when no token is configured for an
    /// authenticated route.
    pub async fn request(
        &self,
        route: &Route,
        query: &[(String, String)],
        body: Option<&Value>,
        reason: Option<&str>,
    ) -> Result<Option<Value>, RestError> {
        let request = self.build(route, query, body, reason)?;
        let key = route.key();
        let attempts = self.attempts();

        for attempt in 1..=attempts {
            let guard = self.limiter.acquire(&key).await;
            let response = self.backend.execute(request.clone()).await?;

            if let Some(bucket) = response.header("x-ratelimit-bucket") {
                self.limiter.record_bucket(&key, bucket);
            }

            if response.status == 429 {
                if response.header("via").is_none() {
                    // Not from the API itself; most likely an edge ban.
                    return Err(RestError::Http {
                        status: 429,
                        body: response.text(),
                    });
                }

                let limit: RateLimitBody =
                    serde_json::from_slice(&response.body).unwrap_or_default();
                let delay = server_delay(limit.retry_after);

                if limit.global {
                    warn!(route = %key, ?delay, "Global rate limit hit, blocking all requests");
                    self.limiter.trip_global();
                    drop(guard);
                    tokio::time::sleep(delay).await;
                    self.limiter.reset_global();
                    info!("Global rate limit cleared");
                } else {
                    warn!(route = %key, ?delay, attempt, "Rate limit hit, retrying after delay");
                    tokio::time::sleep(delay).await;
                    drop(guard);
                }
                continue;
            }

            let exhausted = response.header("x-ratelimit-remaining") == Some("0");
            let reset_after = response
                .header("x-ratelimit-reset-after")
                .and_then(|value| value.parse::<f64>().ok());
            match (exhausted, reset_after) {
                (true, Some(reset_after)) => {
                    debug!(route = %key, reset_after, "Bucket exhausted, delaying further requests");
                    guard.release_after(server_delay(reset_after));
                }
                _ => drop(guard),
            }

            match response.status {
                200..=299 => {
                    if response.status == 204 || response.body.is_empty() {
                        return Ok(None);
                    }
                    return Ok(Some(serde_json::from_slice(&response.body)?));
                }
                400 => return Err(RestError::BadRequest { body: response.text() }),
                403 => return Err(RestError::Forbidden { body: response.text() }),
                404 => return Err(RestError::NotFound { body: response.text() }),
                status @ 500..=599 => {
                    if attempt == attempts {
                        return Err(RestError::ServerError {
                            status,
                            body: response.text(),
                        });
                    }
                    warn!(route = %key, status, attempt, "Server error, retrying");
                    tokio::time::sleep(Duration::from_secs(u64::from(attempt))).await;
                }
                status => {
                    return Err(RestError::Http {
                        status,
                        body: response.text(),
                    })
                }
            }
        }

        Err(RestError::RetriesExhausted {
            route: key,
            attempts,
        })
    }

    async fn get(&self, route: Route) -> Result<Value, RestError> {
        self.request(&route, &[], None, None)
            .await
            .map(Option::unwrap_or_default)
    }

    // Gateway

    pub async fn get_gateway_bot(&self) -> Result<GatewayInfo, RestError> {
        let data = self.get(Route::new(Method::GET, "/gateway/bot")).await?;
        Ok(serde_json::from_value(data)?)
    }

    // Users

    pub async fn get_current_user(&self) -> Result<Value, RestError> {
        self.get(Route::new(Method::GET, "/users/@me")).await
    }

    pub async fn get_user(&self, user_id: u64) -> Result<Value, RestError> {
        self.get(Route::new(Method::GET, "/users/{user_id}").param("user_id", user_id))
            .await
    }

    // Guilds

    pub async fn get_guild(&self, guild_id: u64, with_counts: bool) -> Result<Value, RestError> {
        let route = Route::new(Method::GET, "/guilds/{guild_id}").param("guild_id", guild_id);
        let query = [("with_counts".to_string(), with_counts.to_string())];
        self.request(&route, &query, None, None)
            .await
            .map(Option::unwrap_or_default)
    }

    pub async fn leave_guild(&self, guild_id: u64) -> Result<(), RestError> {
        let route =
            Route::new(Method::DELETE, "/users/@me/guilds/{guild_id}").param("guild_id", guild_id);
        self.request(&route, &[], None, None).await.map(drop)
    }

    // Channels and messages

    pub async fn get_channel(&self, channel_id: u64) -> Result<Value, RestError> {
        self.get(Route::new(Method::GET, "/channels/{channel_id}").param("channel_id", channel_id))
            .await
    }

    pub async fn create_message(&self, channel_id: u64, body: &Value) -> Result<Value, RestError> {
        let route = Route::new(Method::POST, "/channels/{channel_id}/messages")
            .param("channel_id", channel_id);
        self.request(&route, &[], Some(body), None)
            .await
            .map(Option::unwrap_or_default)
    }

    pub async fn delete_message(
        &self,
        channel_id: u64,
        message_id: u64,
        reason: Option<&str>,
    ) -> Result<(), RestError> {
        let route = Route::new(Method::DELETE, "/channels/{channel_id}/messages/{message_id}")
            .param("channel_id", channel_id)
            .param("message_id", message_id);
        self.request(&route, &[], None, reason).await.map(drop)
    }
}

impl fmt::Debug for RestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.config.base_url)
            .field("token", &self.has_token().then_some("<redacted>"))
            .field("limiter", &self.limiter)
            .finish()
    }
}

/// Convert a server-sent delay in seconds, capped at [`MAX_SERVER_DELAY`].
fn server_delay(seconds: f64) -> Duration {
    if seconds.is_nan() || seconds <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(seconds).map_or(MAX_SERVER_DELAY, |delay| delay.min(MAX_SERVER_DELAY))
}
