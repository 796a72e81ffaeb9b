//! Error type shared by sink implementations.

use thiserror::Error;

/// Error type shared by sink implementations.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Failed to encode a record.
    #[error("encode error: {0}")]
    Encode(String),

    /// Failed to decode a record.
    #[error("decode error: {0}")]
    Decode(String),
}
