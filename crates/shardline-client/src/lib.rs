//! # shardline-client
//!
//! Sharded gateway client.
//!
//! - **Shard** - One gateway connection: handshake, heartbeats, resume
//! - **Client** - Shard lifecycle, shared cache and REST access
//! - **Config** - TOML and environment configuration
//! - **Status** - Optional `/health` and `/shards` endpoint
//!
//! ```rust,ignore
//! use shardline_client::{Client, ClientConfig};
//! use shardline_core::EventKind;
//!
//! let client = Client::new(ClientConfig::load()?);
//! client.on(EventKind::Ready, |_| async { println!("ready") });
//! client.setup(token).await?;
//! client.launch().await?;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod shard;
pub mod status;

pub use client::Client;
pub use config::ClientConfig;
pub use error::{ClientError, ShardError};
pub use shard::{Shard, ShardInfo, ShardStatus};
