//! Client and shard errors.

use shardline_protocol::CloseCode;
use shardline_transport::RestError;
use thiserror::Error;

/// Conditions that stop a shard for good.
#[derive(Debug, Error)]
pub enum ShardError {
    /// The application requested privileged intents it does not have.
    #[error("Shard {shard}: privileged intents are not enabled for the application")]
    MissingPrivilegedIntents { shard: u32 },

    /// The gateway closed the socket with a non-recoverable code.
    #[error("Shard {shard} closed by the gateway: {code}")]
    Closed { shard: u32, code: CloseCode },
}

impl ShardError {
    #[must_use]
    pub fn shard(&self) -> u32 {
        match self {
            Self::MissingPrivilegedIntents { shard } | Self::Closed { shard, .. } => *shard,
        }
    }

    pub(crate) fn from_close(shard: u32, code: CloseCode) -> Self {
        match code {
            CloseCode::DisallowedIntents => Self::MissingPrivilegedIntents { shard },
            code => Self::Closed { shard, code },
        }
    }
}

/// Errors returned by [`Client`](crate::Client).
#[derive(Debug, Error)]
pub enum ClientError {
    /// `launch` was called before `setup`.
    #[error("Client is not set up")]
    SetupRequired,

    /// A shard stopped permanently.
    #[error(transparent)]
    Shard(#[from] ShardError),

    #[error(transparent)]
    Rest(#[from] RestError),

    #[error("Invalid payload: {0}")]
    Decode(#[from] serde_json::Error),
}
