//! # shardline-protocol
//!
//! Wire protocol definitions for the shardline gateway client.
//!
//! This crate defines everything that travels over the gateway socket:
//! the JSON envelope, op codes, close codes, gateway intents, the
//! zlib-stream frame codec and the outbound commands (heartbeat,
//! identify, resume).
//!
//! ## Example
//!
//! ```rust
//! use shardline_protocol::{Command, Envelope, OpCode};
//!
//! let heartbeat = Command::heartbeat(Some(42)).to_json().unwrap();
//! assert_eq!(heartbeat, r#"{"op":1,"d":42}"#);
//!
//! let hello = Envelope::from_json(r#"{"op":10,"d":{"heartbeat_interval":41250},"s":null,"t":null}"#).unwrap();
//! assert_eq!(hello.op, OpCode::Hello);
//! ```

pub mod close_codes;
pub mod codec;
pub mod frames;
pub mod intents;
pub mod opcodes;
pub mod version;

pub use close_codes::{CloseAction, CloseCode};
pub use codec::{FrameCodec, ProtocolError, ZLIB_SUFFIX};
pub use frames::{Command, ConnectionProperties, Envelope, Hello, Identify, Resume};
pub use intents::Intents;
pub use opcodes::OpCode;
pub use version::{ApiVersion, API_VERSION};
