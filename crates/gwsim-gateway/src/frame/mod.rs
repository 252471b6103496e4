//! WebSocket framing
//!
//! Stateless frame encoding/decoding plus per-session reassembly of
//! fragmented messages.

mod codec;
mod fragment;

pub use codec::{
    apply_mask, encode, encode_close, try_decode, Frame, FrameError, FrameOpcode,
    MAX_PAYLOAD_SIZE,
};
pub use fragment::{Message, MessageAssembler};
