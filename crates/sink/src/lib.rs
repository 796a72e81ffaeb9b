//! Narrow persistence contract consumed by the vantage stores.
//!
//! Persistence is best-effort: the in-memory stores remain the source of
//! truth during a run, and callers log and swallow sink failures rather
//! than failing the originating operation.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod error;

use std::collections::HashMap;

use async_trait::async_trait;

use vantage_types::{Inference, Registration, Report};

pub use error::Error;

/// Result type for sink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Write-side contract the observation and inference stores depend on.
#[async_trait]
pub trait Sink: Send + Sync + 'static {
    /// Prepare the sink for use.
    async fn open(&self) -> Result<()>;

    /// Flush and release the sink.
    async fn close(&self) -> Result<()>;

    /// Record a registration.
    async fn insert_registration(&self, registration: &Registration) -> Result<()>;

    /// Enumerate previously recorded registrations, keyed by handle.
    /// For a handle recorded more than once, the latest record wins.
    async fn read_registrations(&self) -> Result<HashMap<u64, Registration>>;

    /// Append an accepted report, keyed by `(subject, observer, ts)`.
    async fn append_report(&self, report: &Report) -> Result<()>;

    /// Write the current inference for a subject, replacing any prior one.
    async fn write_inference(&self, inference: &Inference) -> Result<()>;
}
