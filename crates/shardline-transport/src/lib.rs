//! # shardline-transport
//!
//! Network plumbing for the shardline gateway client.
//!
//! - **Gateway** - `Connector` / `GatewayConnection` traits with a
//!   WebSocket implementation
//! - **RateLimiter** - Per-bucket locks and the global gate
//! - **REST** - Rate-limited HTTP client over a pluggable backend
//!
//! ```rust,ignore
//! use shardline_transport::{Connector, Incoming, WebSocketConnector};
//!
//! let conn = WebSocketConnector::default().connect(&url).await?;
//! while let Some(message) = conn.recv().await? {
//!     if let Incoming::Close(code) = message {
//!         break;
//!     }
//! }
//! ```

pub mod ratelimit;
pub mod rest;
pub mod traits;
pub mod websocket;

pub use ratelimit::{RateLimiter, RouteGuard};
pub use rest::{
    GatewayInfo, HttpBackend, HttpRequest, HttpResponse, RestClient, RestConfig, RestError,
    ReqwestBackend, Route, SessionStartLimit,
};
pub use traits::{Connector, GatewayConnection, Incoming, TransportError};
pub use websocket::{WebSocketConnection, WebSocketConnector};
