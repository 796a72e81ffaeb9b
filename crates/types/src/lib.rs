//! Core data model for the vantage health observation exchange.
//!
//! This crate provides:
//! - Observation types (status, metric, observation, report)
//! - Aggregation types (view, panorama, inference)
//! - Registration and peer identity types
//! - Node configuration
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod config;
mod error;
mod inference;
mod peer;
mod registration;
mod report;
mod view;

pub use config::{GcConfig, HoldConfig, NodeConfig, DEFAULT_DB_FILE};
pub use error::Error;
pub use inference::Inference;
pub use peer::Peer;
pub use registration::{Registration, HANDLE_START};
pub use report::{Metric, Observation, Report, Status};
pub use view::{Panorama, View};
