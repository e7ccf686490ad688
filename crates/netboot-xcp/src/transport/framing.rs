//! Length-prefixed framing
//!
//! ```text
//! +--------+------------------------+
//! | len u8 | payload (len bytes)    |
//! +--------+------------------------+
//! ```
//!
//! A zero length byte is a valid, empty frame.

use bytes::{BufMut, Bytes, BytesMut};

use super::{PacketBuffer, TransportError};

/// Largest payload a single frame can carry
pub const MAX_FRAME_PAYLOAD: usize = u8::MAX as usize;

/// Prefix `payload` with its length
pub fn encode_frame(payload: &[u8]) -> Result<Bytes, TransportError> {
    let len = u8::try_from(payload.len())
        .map_err(|_| TransportError::PayloadTooLarge(payload.len()))?;

    let mut frame = BytesMut::with_capacity(1 + payload.len());
    frame.put_u8(len);
    frame.extend_from_slice(payload);
    Ok(frame.freeze())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Length,
    Payload { len: usize, filled: usize },
    Complete,
}

/// Incremental decoder for one frame.
///
/// Bytes may arrive in any number of pieces. The decoder never consumes
/// more than `1 + len` bytes, so whatever follows the frame stays with the
/// caller.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    phase: Phase,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            phase: Phase::Length,
        }
    }

    /// Bytes still needed to finish the current frame (1 while the length is unknown)
    pub fn needed(&self) -> usize {
        match self.phase {
            Phase::Length => 1,
            Phase::Payload { len, filled } => len - filled,
            Phase::Complete => 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Complete
    }

    /// At least the length byte has been seen
    pub fn has_started(&self) -> bool {
        self.phase != Phase::Length
    }

    /// Consume bytes from `input` into `packet`, returning how many were used
    pub fn feed(&mut self, input: &[u8], packet: &mut PacketBuffer) -> usize {
        let mut consumed = 0;

        while consumed < input.len() {
            match self.phase {
                Phase::Length => {
                    let len = input[consumed];
                    consumed += 1;
                    packet.resize(len);
                    self.phase = if len == 0 {
                        Phase::Complete
                    } else {
                        Phase::Payload {
                            len: usize::from(len),
                            filled: 0,
                        }
                    };
                }
                Phase::Payload { len, filled } => {
                    let take = (len - filled).min(input.len() - consumed);
                    let payload = packet.resize(len as u8);
                    payload[filled..filled + take]
                        .copy_from_slice(&input[consumed..consumed + take]);
                    consumed += take;

                    let filled = filled + take;
                    self.phase = if filled == len {
                        Phase::Complete
                    } else {
                        Phase::Payload { len, filled }
                    };
                }
                Phase::Complete => break,
            }
        }

        consumed
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
