//! XCP protocol errors

use thiserror::Error;

use super::{Command, XcpErrorCode};
use crate::transport::TransportError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum XcpError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("{command} rejected by device: {}", describe_code(.error_code))]
    Rejected {
        command: Command,
        error_code: Option<XcpErrorCode>,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Not connected to the XCP slave")]
    NotConnected,
}

impl XcpError {
    /// The request was sent but no complete response arrived in time
    pub fn is_no_response(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_timeout())
    }
}

fn describe_code(code: &Option<XcpErrorCode>) -> String {
    match code {
        Some(code) => format!("{} (0x{:02X})", code, code),
        None => "unexpected packet identifier".to_string(),
    }
}
