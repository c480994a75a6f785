//! Client configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (SHARDLINE_*)
//! - TOML configuration file

use anyhow::{Context, Result};
use serde::Deserialize;
use shardline_core::CacheConfig;
use shardline_protocol::Intents;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Bot token.
    #[serde(default = "default_token")]
    pub token: Option<String>,

    /// Number of shards. Uses the gateway's recommendation when unset.
    #[serde(default = "default_shard_count")]
    pub shard_count: Option<u32>,

    /// Gateway intents as a raw bit set.
    #[serde(default)]
    pub intents: Intents,

    /// Attempts per REST request (1 to 5).
    #[serde(default = "default_max_retries")]
    pub max_retries: u8,

    /// How long to wait for a shard to connect and identify.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Quiescence timeout for guild backfill after READY.
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_ms: u64,

    /// Emit a raw `gateway_dispatch` event for every dispatch.
    #[serde(default)]
    pub debug_events: bool,

    /// Cache sizing.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Reconnect behaviour.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Status endpoint configuration.
    #[serde(default)]
    pub status: StatusConfig,
}

/// Reconnect configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Smallest reconnect delay in milliseconds.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    /// Largest reconnect delay in milliseconds.
    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: u64,

    /// Delay before reconnecting after INVALID_SESSION.
    #[serde(default = "default_invalid_session_delay")]
    pub invalid_session_delay_ms: u64,
}

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Enable the Prometheus exporter.
    #[serde(default)]
    pub enabled: bool,

    /// Exporter port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Status endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_status_host")]
    pub host: String,

    #[serde(default = "default_status_port")]
    pub port: u16,
}

// Default value functions
fn default_token() -> Option<String> {
    std::env::var("SHARDLINE_TOKEN").ok().filter(|t| !t.is_empty())
}

fn default_shard_count() -> Option<u32> {
    std::env::var("SHARDLINE_SHARD_COUNT")
        .ok()
        .and_then(|n| n.parse().ok())
}

fn default_max_retries() -> u8 {
    5
}

fn default_connect_timeout() -> u64 {
    30_000
}

fn default_ready_timeout() -> u64 {
    2_000
}

fn default_backoff_base() -> u64 {
    1_000
}

fn default_backoff_max() -> u64 {
    60_000
}

fn default_invalid_session_delay() -> u64 {
    5_000
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_status_host() -> String {
    "127.0.0.1".to_string()
}

fn default_status_port() -> u16 {
    8080
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            token: default_token(),
            shard_count: default_shard_count(),
            intents: Intents::default(),
            max_retries: default_max_retries(),
            connect_timeout_ms: default_connect_timeout(),
            ready_timeout_ms: default_ready_timeout(),
            debug_events: false,
            cache: CacheConfig::default(),
            gateway: GatewayConfig::default(),
            metrics: MetricsConfig::default(),
            status: StatusConfig::default(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            backoff_base_ms: default_backoff_base(),
            backoff_max_ms: default_backoff_max(),
            invalid_session_delay_ms: default_invalid_session_delay(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_status_host(),
            port: default_status_port(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_paths = [
            "shardline.toml",
            "/etc/shardline/shardline.toml",
            "~/.config/shardline/shardline.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid configuration.
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    #[must_use]
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    /// Address of the status endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn status_addr(&self) -> Result<SocketAddr> {
        let addr = format!("{}:{}", self.status.host, self.status.port);
        addr.parse()
            .with_context(|| format!("Invalid status address: {addr}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::from_toml("").unwrap();
        assert_eq!(config.intents, Intents::unprivileged());
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.ready_timeout(), Duration::from_secs(2));
        assert_eq!(config.gateway.invalid_session_delay_ms, 5_000);
        assert_eq!(config.cache.max_messages, 1000);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_sections() {
        let config = ClientConfig::from_toml(
            r#"
            token = "abc"
            shard_count = 4
            intents = 513
            debug_events = true

            [cache]
            max_messages = 50

            [gateway]
            backoff_base_ms = 250

            [status]
            enabled = true
            port = 9000
            "#,
        )
        .unwrap();

        assert_eq!(config.token.as_deref(), Some("abc"));
        assert_eq!(config.shard_count, Some(4));
        assert_eq!(config.intents, Intents::GUILDS | Intents::GUILD_MESSAGES);
        assert!(config.debug_events);
        assert_eq!(config.cache.max_messages, 50);
        assert_eq!(config.cache.max_users, 1000);
        assert_eq!(config.gateway.backoff_base_ms, 250);
        assert_eq!(config.gateway.backoff_max_ms, 60_000);
        assert_eq!(config.status_addr().unwrap().port(), 9000);
    }

    #[test]
    fn test_rejects_bad_types() {
        assert!(ClientConfig::from_toml("shard_count = \"many\"").is_err());
    }
}
