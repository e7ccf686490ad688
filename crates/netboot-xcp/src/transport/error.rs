//! Transport error types

use thiserror::Error;

/// Transport-level errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Transport is not connected")]
    NotConnected,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("No response within {timeout_ms} ms")]
    ReceiveTimeout { timeout_ms: u64 },

    #[error("Packet of {0} bytes does not fit in a single frame")]
    PayloadTooLarge(usize),
}

impl TransportError {
    /// The request went out but nothing (or only part of a frame) came back in time
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ReceiveTimeout { .. })
    }
}
