//! Gateway envelopes and outbound commands.
//!
//! Every gateway message is a JSON envelope `{op, d, s, t}`. Inbound
//! envelopes are kept loosely typed (`d` stays a [`serde_json::Value`])
//! since the meaning of `d` depends on `op` and, for dispatches, on `t`.
//! Outbound commands are strongly typed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::ProtocolError;
use crate::intents::Intents;
use crate::opcodes::OpCode;

/// An inbound gateway envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Operation code.
    pub op: OpCode,
    /// Payload, `null` when absent.
    #[serde(default)]
    pub d: Value,
    /// Sequence number, only set on dispatches.
    #[serde(default)]
    pub s: Option<u64>,
    /// Event name, only set on dispatches.
    #[serde(default)]
    pub t: Option<String>,
}

impl Envelope {
    /// Parse an envelope from decoded frame text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid envelope.
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Json)
    }

    /// Serialize the envelope back to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Json)
    }

    /// Create a dispatch envelope.
    #[must_use]
    pub fn dispatch(name: impl Into<String>, sequence: u64, data: Value) -> Self {
        Self {
            op: OpCode::Dispatch,
            d: data,
            s: Some(sequence),
            t: Some(name.into()),
        }
    }

    /// Create a hello envelope.
    #[must_use]
    pub fn hello(heartbeat_interval_ms: u64) -> Self {
        Self {
            op: OpCode::Hello,
            d: serde_json::json!({ "heartbeat_interval": heartbeat_interval_ms }),
            s: None,
            t: None,
        }
    }

    /// Create an envelope without a payload.
    #[must_use]
    pub fn bare(op: OpCode) -> Self {
        Self {
            op,
            d: Value::Null,
            s: None,
            t: None,
        }
    }

    /// Create an invalid session envelope.
    #[must_use]
    pub fn invalid_session(resumable: bool) -> Self {
        Self {
            op: OpCode::InvalidSession,
            d: Value::Bool(resumable),
            s: None,
            t: None,
        }
    }
}

/// Payload of the `HELLO` op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Heartbeat interval in milliseconds.
    pub heartbeat_interval: u64,
}

impl Hello {
    /// Extract the hello payload from an envelope's `d` field.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is malformed or the interval is 0.
    pub fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        let hello = Self::deserialize(value).map_err(ProtocolError::Json)?;
        if hello.heartbeat_interval == 0 {
            return Err(ProtocolError::ZeroHeartbeatInterval);
        }
        Ok(hello)
    }
}

/// Client properties sent with identify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionProperties {
    pub os: String,
    pub browser: String,
    pub device: String,
}

impl Default for ConnectionProperties {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: "shardline".to_string(),
            device: "shardline".to_string(),
        }
    }
}

/// Payload of the `IDENTIFY` command.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Identify {
    pub token: String,
    pub intents: Intents,
    pub properties: ConnectionProperties,
    pub compress: bool,
    /// `[shard index, shard count]`.
    pub shard: [u32; 2],
}

impl Identify {
    #[must_use]
    pub fn new(token: impl Into<String>, intents: Intents, shard: u32, shard_count: u32) -> Self {
        Self {
            token: token.into(),
            intents,
            properties: ConnectionProperties::default(),
            compress: true,
            shard: [shard, shard_count],
        }
    }
}

impl std::fmt::Debug for Identify {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identify")
            .field("token", &"<redacted>")
            .field("intents", &self.intents)
            .field("properties", &self.properties)
            .field("compress", &self.compress)
            .field("shard", &self.shard)
            .finish()
    }
}

/// Payload of the `RESUME` command.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Resume {
    pub session_id: String,
    pub token: String,
    pub seq: Option<u64>,
}

impl std::fmt::Debug for Resume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resume")
            .field("session_id", &self.session_id)
            .field("token", &"<redacted>")
            .field("seq", &self.seq)
            .finish()
    }
}

/// A command sent from the client to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Heartbeat carrying the last sequence number seen.
    Heartbeat(Option<u64>),
    Identify(Identify),
    Resume(Resume),
}

#[derive(Serialize)]
struct Outbound<'a, T: Serialize> {
    op: OpCode,
    d: &'a T,
}

impl Command {
    /// Create a heartbeat command.
    #[must_use]
    pub fn heartbeat(sequence: Option<u64>) -> Self {
        Command::Heartbeat(sequence)
    }

    /// Op code of the command.
    #[must_use]
    pub fn op(&self) -> OpCode {
        match self {
            Command::Heartbeat(_) => OpCode::Heartbeat,
            Command::Identify(_) => OpCode::Identify,
            Command::Resume(_) => OpCode::Resume,
        }
    }

    /// Encode the command as an `{op, d}` JSON envelope.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        let op = self.op();
        let encoded = match self {
            Command::Heartbeat(seq) => serde_json::to_string(&Outbound { op, d: seq }),
            Command::Identify(identify) => serde_json::to_string(&Outbound { op, d: identify }),
            Command::Resume(resume) => serde_json::to_string(&Outbound { op, d: resume }),
        };
        encoded.map_err(ProtocolError::Json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_dispatch_envelope() {
        let text = r#"{"op":0,"d":{"session_id":"abc"},"s":3,"t":"READY"}"#;
        let envelope = Envelope::from_json(text).unwrap();
        assert_eq!(envelope.op, OpCode::Dispatch);
        assert_eq!(envelope.s, Some(3));
        assert_eq!(envelope.t.as_deref(), Some("READY"));
        assert_eq!(envelope.d["session_id"], "abc");
    }

    #[test]
    fn test_parse_envelope_missing_fields() {
        let envelope = Envelope::from_json(r#"{"op":11}"#).unwrap();
        assert_eq!(envelope.op, OpCode::HeartbeatAck);
        assert!(envelope.d.is_null());
        assert!(envelope.s.is_none());
        assert!(envelope.t.is_none());
    }

    #[test]
    fn test_hello_payload() {
        let envelope = Envelope::hello(41_250);
        let hello = Hello::from_value(&envelope.d).unwrap();
        assert_eq!(hello.heartbeat_interval, 41_250);
    }

    #[test]
    fn test_hello_rejects_zero_interval() {
        assert!(matches!(
            Hello::from_value(&json!({"heartbeat_interval": 0})),
            Err(ProtocolError::ZeroHeartbeatInterval)
        ));
        assert!(Hello::from_value(&json!({})).is_err());
    }

    #[test]
    fn test_heartbeat_encoding() {
        assert_eq!(Command::heartbeat(None).to_json().unwrap(), r#"{"op":1,"d":null}"#);
        assert_eq!(Command::heartbeat(Some(7)).to_json().unwrap(), r#"{"op":1,"d":7}"#);
    }

    #[test]
    fn test_identify_encoding() {
        let identify = Identify::new("secret", Intents::GUILDS | Intents::GUILD_MESSAGES, 1, 4);
        let encoded = Command::Identify(identify).to_json().unwrap();
        let value: Value = serde_json::from_str(&encoded).unwrap();

        assert_eq!(value["op"], 2);
        assert_eq!(value["d"]["token"], "secret");
        assert_eq!(value["d"]["intents"], json!(1 | (1 << 9)));
        assert_eq!(value["d"]["compress"], true);
        assert_eq!(value["d"]["shard"], json!([1, 4]));
        assert_eq!(value["d"]["properties"]["browser"], "shardline");
    }

    #[test]
    fn test_resume_encoding() {
        let resume = Resume {
            session_id: "session".into(),
            token: "secret".into(),
            seq: Some(99),
        };
        let encoded = Command::Resume(resume).to_json().unwrap();
        let value: Value = serde_json::from_str(&encoded).unwrap();

        assert_eq!(value, json!({"op": 6, "d": {"session_id": "session", "token": "secret", "seq": 99}}));
    }

    #[test]
    fn test_debug_redacts_token() {
        let identify = Identify::new("secret", Intents::GUILDS, 0, 1);
        assert!(!format!("{identify:?}").contains("secret"));
    }
}
