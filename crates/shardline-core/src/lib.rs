//! # shardline-core
//!
//! State and event plumbing for the shardline gateway client.
//!
//! - **Id** - Typed snowflake ids
//! - **Model** - Plain data parsed from payloads
//! - **Cache** - Guilds, users, channels and messages
//! - **DispatchRouter** - Gateway dispatches to cache updates and events
//! - **ReadyBarrier** - Detects the end of a shard's guild backfill
//! - **EventBus** - User callbacks
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌────────────────┐     ┌─────────────┐
//! │    Shard    │────▶│ DispatchRouter │────▶│  EventBus   │
//! └─────────────┘     └────────────────┘     └─────────────┘
//!                        │          │
//!                        ▼          ▼
//!                 ┌─────────┐  ┌──────────────┐
//!                 │  Cache  │  │ ReadyBarrier │
//!                 └─────────┘  └──────────────┘
//! ```

pub mod bus;
pub mod cache;
pub mod dispatch;
pub mod events;
pub mod id;
pub mod model;
pub mod ready;

pub use bus::{EventBus, Listener};
pub use cache::{Cache, CacheConfig, GuildCache};
pub use dispatch::{DispatchError, DispatchKind, DispatchRouter, RouterConfig};
pub use events::{Event, EventKind, UnknownEvent};
pub use id::Id;
pub use ready::{ReadyBarrier, DEFAULT_READY_TIMEOUT};
