//! # shardline
//!
//! Runs a gateway client and logs what it sees.
//!
//! ## Usage
//!
//! ```bash
//! # Token from the environment
//! SHARDLINE_TOKEN=... shardline
//!
//! # Or from shardline.toml in the working directory
//! shardline
//! ```

use anyhow::{Context, Result};
use shardline_client::{metrics, status, Client, ClientConfig};
use shardline_core::{Event, EventKind};
use std::sync::Arc;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shardline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ClientConfig::load()?;
    let token = config
        .token
        .clone()
        .context("No token configured, set SHARDLINE_TOKEN or `token` in shardline.toml")?;

    if config.metrics.enabled {
        metrics::init_metrics();
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let client = Arc::new(Client::new(config));
    register_listeners(&client);

    if client.config().status.enabled {
        let addr = client.config().status_addr()?;
        let status_client = Arc::clone(&client);
        tokio::spawn(async move {
            if let Err(e) = status::serve(status_client, addr).await {
                error!("Status endpoint failed: {}", e);
            }
        });
    }

    client.setup(token).await?;
    info!(shards = client.shards().len(), "Launching");

    tokio::select! {
        result = client.launch() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            client.close().await;
        }
    }

    Ok(())
}

fn register_listeners(client: &Client) {
    client.on(EventKind::Ready, |_| async {
        info!("Client ready");
    });
    client.on(EventKind::ShardReady, |event| async move {
        if let Some(shard) = event.shard() {
            info!(shard, "Shard ready");
        }
    });
    client.on(EventKind::GuildJoin, |event| async move {
        if let Event::GuildJoin { guild, .. } = &*event {
            info!(guild = %guild.id, name = %guild.name, "Joined guild");
        }
    });
    client.on(EventKind::GuildLeave, |event| async move {
        if let Event::GuildLeave { guild, .. } = &*event {
            info!(guild = %guild.id, "Left guild");
        }
    });
    client.on(EventKind::MessageCreate, |event| async move {
        if let Event::MessageCreate { message, .. } = &*event {
            debug!(channel = %message.channel_id, author = %message.author.tag(), "Message");
        }
    });
}
