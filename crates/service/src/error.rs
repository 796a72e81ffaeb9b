//! Error types for the service front-end.

use thiserror::Error;

/// Error type for the service front-end.
#[derive(Debug, Error)]
pub enum Error {
    /// The submission handle is not known, and no matching old
    /// registration could re-authorize it.
    #[error("invalid submission handle")]
    InvalidHandle,

    /// A query named a subject with no data.
    #[error("no data for subject {0}")]
    UnknownSubject(String),

    /// Report ingestion failed structurally.
    #[error(transparent)]
    Store(#[from] vantage_store::Error),

    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The node is already running.
    #[error("node already started")]
    AlreadyStarted,

    /// The node has not been started.
    #[error("node not started")]
    NotStarted,

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}
