//! RFC 6455 frame codec
//!
//! `try_decode` is called against the whole retained input buffer and never
//! consumes anything until a complete frame is present. Masked client frames
//! are unmasked before the payload is returned.

/// Largest payload accepted from a single frame (16 MiB)
pub const MAX_PAYLOAD_SIZE: u64 = 16 * 1024 * 1024;

/// Largest payload a Close, Ping or Pong frame may carry
pub const MAX_CONTROL_PAYLOAD: u64 = 125;

/// Frame opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameOpcode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl FrameOpcode {
    /// Parse the low nibble of the first header byte
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Self::Continuation),
            0x1 => Some(Self::Text),
            0x2 => Some(Self::Binary),
            0x8 => Some(Self::Close),
            0x9 => Some(Self::Ping),
            0xA => Some(Self::Pong),
            _ => None,
        }
    }

    /// Close, Ping and Pong
    #[must_use]
    pub const fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }
}

/// One decoded frame with its payload already unmasked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: FrameOpcode,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Status code carried by a Close frame, if any
    #[must_use]
    pub fn close_code(&self) -> Option<u16> {
        if self.opcode != FrameOpcode::Close {
            return None;
        }
        match self.payload.as_slice() {
            [hi, lo, ..] => Some(u16::from_be_bytes([*hi, *lo])),
            _ => None,
        }
    }
}

/// Frame decoding errors
///
/// A short buffer is not an error: `try_decode` returns `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("unknown frame opcode {0:#x}")]
    UnknownOpcode(u8),

    #[error("frame payload of {0} bytes exceeds limit")]
    PayloadTooLarge(u64),

    #[error("continuation frame without a message in progress")]
    UnexpectedContinuation,

    #[error("new data frame while a fragmented message is in progress")]
    InterleavedMessage,

    #[error("control frame payload of {0} bytes exceeds 125")]
    ControlFrameTooLong(u64),

    #[error("control frame without FIN")]
    FragmentedControlFrame,
}

/// XOR `payload` in place with the 4-byte masking key
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

/// Try to decode one frame from the front of `buf`
///
/// Returns the frame and the number of bytes it occupied, or `Ok(None)` when
/// `buf` is shorter than the frame its header declares. Control frames must
/// carry FIN and at most 125 payload bytes.
pub fn try_decode(buf: &[u8]) -> Result<Option<(Frame, usize)>, FrameError> {
    let [b0, b1, ..] = *buf else {
        return Ok(None);
    };

    let fin = b0 & 0x80 != 0;
    let opcode = FrameOpcode::from_u8(b0 & 0x0F).ok_or(FrameError::UnknownOpcode(b0 & 0x0F))?;
    let masked = b1 & 0x80 != 0;

    let (payload_len, mut offset) = match b1 & 0x7F {
        126 => match buf.get(2..4) {
            Some(ext) => (u64::from(u16::from_be_bytes([ext[0], ext[1]])), 4),
            None => return Ok(None),
        },
        127 => match buf.get(2..10) {
            Some(ext) => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(ext);
                (u64::from_be_bytes(raw), 10)
            }
            None => return Ok(None),
        },
        len => (u64::from(len), 2),
    };

    if opcode.is_control() {
        if payload_len > MAX_CONTROL_PAYLOAD {
            return Err(FrameError::ControlFrameTooLong(payload_len));
        }
        if !fin {
            return Err(FrameError::FragmentedControlFrame);
        }
    }
    if payload_len > MAX_PAYLOAD_SIZE {
        return Err(FrameError::PayloadTooLarge(payload_len));
    }
    // Bounded by MAX_PAYLOAD_SIZE, so this fits in usize
    let payload_len = payload_len as usize;

    let mask = if masked {
        match buf.get(offset..offset + 4) {
            Some(key) => {
                offset += 4;
                Some([key[0], key[1], key[2], key[3]])
            }
            None => return Ok(None),
        }
    } else {
        None
    };

    let total = offset + payload_len;
    let Some(raw) = buf.get(offset..total) else {
        return Ok(None);
    };

    let mut payload = raw.to_vec();
    if let Some(key) = mask {
        apply_mask(&mut payload, key);
    }

    Ok(Some((
        Frame {
            fin,
            opcode,
            payload,
        },
        total,
    )))
}

/// Encode a single unmasked server frame with FIN set
#[must_use]
pub fn encode(opcode: FrameOpcode, payload: &[u8]) -> Vec<u8> {
    let len = payload.len();
    let mut out = Vec::with_capacity(len + 10);
    out.push(0x80 | opcode as u8);

    if len <= 125 {
        out.push(len as u8);
    } else if let Ok(len16) = u16::try_from(len) {
        out.push(126);
        out.extend_from_slice(&len16.to_be_bytes());
    } else {
        out.push(127);
        out.extend_from_slice(&(len as u64).to_be_bytes());
    }

    out.extend_from_slice(payload);
    out
}

/// Encode a Close frame carrying `code`
#[must_use]
pub fn encode_close(code: u16) -> Vec<u8> {
    encode(FrameOpcode::Close, &code.to_be_bytes())
}
