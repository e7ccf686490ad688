//! Update error types

use netboot_srec::ImageError;
use netboot_xcp::{TransportError, XcpError};
use thiserror::Error;

use crate::Step;

/// Why an update step failed
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("Invalid firmware image: {0}")]
    ImageInvalid(#[source] ImageError),

    #[error("Cannot read firmware image: {0}")]
    ImageIo(#[source] ImageError),

    #[error("Cannot connect: {0}")]
    Connection(#[source] TransportError),

    #[error("Communication failed: {0}")]
    Send(#[source] TransportError),

    #[error("Device did not respond: {0}")]
    ReceiveTimeout(#[source] TransportError),

    #[error("{0}")]
    ProtocolRejected(#[source] XcpError),

    #[error("Unexpected device response: {0}")]
    InvalidResponse(#[source] XcpError),
}

impl From<ImageError> for UpdateError {
    fn from(err: ImageError) -> Self {
        if err.is_invalid() {
            Self::ImageInvalid(err)
        } else {
            Self::ImageIo(err)
        }
    }
}

impl From<TransportError> for UpdateError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::ConnectionFailed(_) => Self::Connection(err),
            TransportError::ReceiveTimeout { .. } => Self::ReceiveTimeout(err),
            _ => Self::Send(err),
        }
    }
}

impl From<XcpError> for UpdateError {
    fn from(err: XcpError) -> Self {
        match err {
            XcpError::Transport(transport) => transport.into(),
            XcpError::Rejected { .. } => Self::ProtocolRejected(err),
            XcpError::InvalidResponse(_) | XcpError::NotConnected => Self::InvalidResponse(err),
        }
    }
}

/// A failed update: the step that failed and why
#[derive(Debug, Error)]
#[error("Failed to {step}: {error}")]
pub struct UpdateFailure {
    pub step: Step,
    #[source]
    pub error: UpdateError,
}
