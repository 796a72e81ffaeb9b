//! Error types for the stores.

use thiserror::Error;

/// Error type for the stores.
#[derive(Debug, Error)]
pub enum Error {
    /// The report is structurally unusable.
    #[error("malformed report: {0}")]
    MalformedReport(&'static str),
}
