//! Error types for the exchange.

use thiserror::Error;

/// Result type for exchange operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the exchange.
#[derive(Debug, Error)]
pub enum Error {
    /// Wire-level failure.
    #[error(transparent)]
    Wire(#[from] vantage_wire::Error),

    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The peer did not answer in time.
    #[error("send to {0} timed out")]
    Timeout(String),

    /// The peer closed the connection before replying.
    #[error("connection closed before a reply")]
    Closed,

    /// The peer answered with an error reply.
    #[error("peer error: {0}")]
    Peer(String),
}
