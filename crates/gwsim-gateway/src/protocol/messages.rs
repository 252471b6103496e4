//! Gateway message envelope
//!
//! Every frame carries one `{op, d, s, t}` object in either wire encoding.

use super::{HelloPayload, OpCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Gateway message envelope
///
/// All four keys are always present on the wire; `s` and `t` are null except
/// on dispatches.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayMessage {
    /// Operation code
    pub op: OpCode,

    /// Event data payload
    pub d: Value,

    /// Sequence number (dispatches and heartbeat ACKs)
    pub s: Option<u64>,

    /// Event name (dispatches only)
    pub t: Option<String>,
}

/// Inbound envelope before the op code is validated
#[derive(Deserialize)]
struct RawEnvelope {
    op: u64,
    #[serde(default)]
    d: Value,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    t: Option<String>,
}

/// Why an inbound envelope was rejected
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unknown op code {0}")]
    UnknownOpcode(u64),
}

impl GatewayMessage {
    // === Server Messages ===

    /// Create a Dispatch message (op=0)
    #[must_use]
    pub fn dispatch(event_type: impl Into<String>, sequence: u64, data: Value) -> Self {
        Self {
            op: OpCode::Dispatch,
            d: data,
            s: Some(sequence),
            t: Some(event_type.into()),
        }
    }

    /// Create a Hello message (op=10)
    #[must_use]
    pub fn hello(heartbeat_interval: u64) -> Self {
        Self {
            op: OpCode::Hello,
            d: serde_json::to_value(HelloPayload { heartbeat_interval }).unwrap_or_default(),
            s: None,
            t: None,
        }
    }

    /// Create a Heartbeat ACK message (op=11) carrying the last sequence number
    #[must_use]
    pub fn heartbeat_ack(last_sequence: u64) -> Self {
        Self {
            op: OpCode::HeartbeatAck,
            d: Value::Null,
            s: Some(last_sequence),
            t: None,
        }
    }

    /// Create a Reconnect message (op=7)
    #[must_use]
    pub fn reconnect() -> Self {
        Self {
            op: OpCode::Reconnect,
            d: Value::Null,
            s: None,
            t: None,
        }
    }

    // === Parsing Client Messages ===

    /// Parse a decoded JSON value into an envelope
    pub fn from_value(value: Value) -> Result<Self, EnvelopeError> {
        let raw: RawEnvelope = serde_json::from_value(value)?;
        let op = u8::try_from(raw.op)
            .ok()
            .and_then(OpCode::from_u8)
            .ok_or(EnvelopeError::UnknownOpcode(raw.op))?;

        Ok(Self {
            op,
            d: raw.d,
            s: raw.s,
            t: raw.t,
        })
    }

    /// Decode the `d` field into a typed payload
    pub fn payload<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.d)
    }
}

impl std::fmt::Display for GatewayMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(t) = &self.t {
            write!(f, "GatewayMessage(op={}, t={}", self.op, t)?;
            if let Some(s) = self.s {
                write!(f, ", s={s}")?;
            }
            write!(f, ")")
        } else {
            write!(f, "GatewayMessage(op={})", self.op)
        }
    }
}
