//! Observation, hold-buffer and inference stores.
//!
//! The observation store is a three-level indexed map (subject, observer,
//! chronological view) with acceptance filtering, bounded retention and
//! garbage collection. The inference store turns panoramas into cached
//! per-subject verdicts on a background worker. The hold buffer parks
//! ignored reports in case interest develops later.

mod error;
mod hold;
mod inference;
mod observation;

pub use error::Error;
pub use hold::HoldBuffer;
pub use inference::InferenceStore;
pub use observation::{AcceptCode, ObservationStore, MAX_OBSERVATIONS_PER_VIEW};

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, Error>;
