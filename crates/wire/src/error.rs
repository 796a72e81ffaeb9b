//! Error types for the wire layer.

use thiserror::Error;

/// Error type for the wire layer.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Failed to encode a message.
    #[error("encode error: {0}")]
    Encode(String),

    /// Failed to decode a message.
    #[error("decode error: {0}")]
    Decode(String),

    /// A frame exceeded the size cap.
    #[error("frame of {0} bytes exceeds the size cap")]
    FrameTooLarge(usize),
}
