//! Error type for configuration loading.

use thiserror::Error;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to read the config file.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Failed to parse the config file.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
