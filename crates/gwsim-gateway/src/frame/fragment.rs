//! Fragmented message reassembly

use super::{Frame, FrameError, FrameOpcode, MAX_PAYLOAD_SIZE};

/// A complete data message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Text or Binary
    pub opcode: FrameOpcode,
    pub payload: Vec<u8>,
}

/// Per-session reassembly state for data frames
///
/// Control frames must be handled before calling [`MessageAssembler::push`].
#[derive(Debug, Default)]
pub struct MessageAssembler {
    opcode: Option<FrameOpcode>,
    buffer: Vec<u8>,
}

impl MessageAssembler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a fragmented message is in progress
    #[must_use]
    pub fn is_assembling(&self) -> bool {
        self.opcode.is_some()
    }

    /// Feed one data frame; returns the message once its final fragment arrives
    pub fn push(&mut self, frame: Frame) -> Result<Option<Message>, FrameError> {
        match (frame.opcode, self.opcode) {
            (FrameOpcode::Text | FrameOpcode::Binary, None) if frame.fin => Ok(Some(Message {
                opcode: frame.opcode,
                payload: frame.payload,
            })),
            (FrameOpcode::Text | FrameOpcode::Binary, None) => {
                self.opcode = Some(frame.opcode);
                self.buffer = frame.payload;
                Ok(None)
            }
            (FrameOpcode::Continuation, Some(opcode)) => {
                let total = (self.buffer.len() + frame.payload.len()) as u64;
                if total > MAX_PAYLOAD_SIZE {
                    self.reset();
                    return Err(FrameError::PayloadTooLarge(total));
                }
                self.buffer.extend_from_slice(&frame.payload);
                if !frame.fin {
                    return Ok(None);
                }
                self.opcode = None;
                Ok(Some(Message {
                    opcode,
                    payload: std::mem::take(&mut self.buffer),
                }))
            }
            (FrameOpcode::Continuation, None) => Err(FrameError::UnexpectedContinuation),
            (FrameOpcode::Text | FrameOpcode::Binary, Some(_)) => {
                self.reset();
                Err(FrameError::InterleavedMessage)
            }
            (other, _) => Err(FrameError::UnknownOpcode(other as u8)),
        }
    }

    fn reset(&mut self) {
        self.opcode = None;
        self.buffer.clear();
    }
}
