//! Image error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Not a valid S-record file: {0}")]
    Invalid(String),

    #[error("Malformed record on line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("Image contains no data records")]
    Empty,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image is closed")]
    Closed,
}

impl ImageError {
    /// The image content is unusable, as opposed to the file being unreadable
    pub fn is_invalid(&self) -> bool {
        matches!(
            self,
            Self::Invalid(_) | Self::Malformed { .. } | Self::Empty
        )
    }
}
