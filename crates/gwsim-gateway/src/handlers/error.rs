//! Handler error types

use crate::connection::ConnectionError;
use crate::frame::FrameError;
use crate::protocol::{CloseCode, EnvelopeError};
use gwsim_etf::EtfError;
use thiserror::Error;

/// Protocol-logic and decode failures raised while serving a session
///
/// Every variant ends the session; [`HandlerError::to_close_code`] picks the
/// code sent to the client.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Payload did not match the expected shape
    #[error("Decode error: {0}")]
    Decode(String),

    /// Unknown op, or an op only the server may send
    #[error("Unknown op code {0}")]
    UnknownOpcode(u64),

    /// Op other than Heartbeat/Identify before Identify
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Second Identify on one session
    #[error("Already authenticated")]
    AlreadyAuthenticated,

    #[error("Invalid shard: {0}")]
    InvalidShard(String),

    /// The shard would carry more guilds than allowed
    #[error("Sharding required: {guilds} guilds per shard exceeds {max}")]
    ShardingRequired { guilds: u32, max: u32 },

    #[error("Invalid API version")]
    InvalidApiVersion,

    #[error("Invalid intents: {0:#x}")]
    InvalidIntents(u64),

    /// No heartbeat within the timeout
    #[error("Session timed out")]
    SessionTimedOut,

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("ETF error: {0}")]
    Etf(#[from] EtfError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// Transport failure; the session is dropped without a close frame
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
}

impl HandlerError {
    /// Close code sent to the client for this error
    #[must_use]
    pub fn to_close_code(&self) -> CloseCode {
        match self {
            Self::Decode(_) | Self::Etf(_) | Self::Json(_) => CloseCode::DecodeError,
            Self::UnknownOpcode(_) => CloseCode::UnknownOpcode,
            Self::NotAuthenticated => CloseCode::NotAuthenticated,
            Self::AlreadyAuthenticated => CloseCode::AlreadyAuthenticated,
            Self::InvalidShard(_) => CloseCode::InvalidShard,
            Self::ShardingRequired { .. } => CloseCode::ShardingRequired,
            Self::InvalidApiVersion => CloseCode::InvalidApiVersion,
            Self::InvalidIntents(_) => CloseCode::InvalidIntents,
            Self::SessionTimedOut => CloseCode::SessionTimedOut,
            // A bad opcode means the stream has lost sync
            Self::Frame(FrameError::UnknownOpcode(_)) => CloseCode::UnknownError,
            Self::Frame(_) => CloseCode::DecodeError,
            Self::Envelope(EnvelopeError::UnknownOpcode(_)) => CloseCode::UnknownOpcode,
            Self::Envelope(EnvelopeError::Malformed(_)) => CloseCode::DecodeError,
            Self::Connection(_) => CloseCode::UnknownError,
        }
    }
}

/// Handler result type
pub type HandlerResult<T> = Result<T, HandlerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(HandlerError::Decode("bad".into()), 4002 ; "decode")]
    #[test_case(HandlerError::UnknownOpcode(5), 4001 ; "unknown op")]
    #[test_case(HandlerError::NotAuthenticated, 4003 ; "not authenticated")]
    #[test_case(HandlerError::AlreadyAuthenticated, 4005 ; "already authenticated")]
    #[test_case(HandlerError::InvalidShard("1/1".into()), 4010 ; "invalid shard")]
    #[test_case(HandlerError::ShardingRequired { guilds: 3000, max: 2500 }, 4011 ; "sharding required")]
    #[test_case(HandlerError::InvalidApiVersion, 4012 ; "invalid api version")]
    #[test_case(HandlerError::InvalidIntents(1 << 40), 4013 ; "invalid intents")]
    #[test_case(HandlerError::SessionTimedOut, 4009 ; "timed out")]
    #[test_case(HandlerError::Frame(FrameError::UnknownOpcode(3)), 4000 ; "desynchronized frame")]
    #[test_case(HandlerError::Frame(FrameError::UnexpectedContinuation), 4002 ; "stray continuation")]
    #[test_case(HandlerError::Frame(FrameError::ControlFrameTooLong(126)), 4002 ; "oversized control frame")]
    #[test_case(HandlerError::Frame(FrameError::FragmentedControlFrame), 4002 ; "fragmented control frame")]
    #[test_case(HandlerError::Etf(EtfError::BadVersion(0)), 4002 ; "etf")]
    #[test_case(HandlerError::Envelope(EnvelopeError::UnknownOpcode(99)), 4001 ; "envelope op")]
    fn test_close_code_mapping(err: HandlerError, code: u16) {
        assert_eq!(err.to_close_code().as_u16(), code);
    }
}
