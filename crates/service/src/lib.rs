//! Service front-end and node lifecycle for the vantage exchange.
//!
//! A [`HealthNode`] ties the stores, the inference worker and the exchange
//! together behind the wire protocol: local modules register and submit
//! reports, peers push learned reports, and queries read the stores.

mod error;
mod node;
mod server;

pub use error::Error;
pub use node::HealthNode;

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, Error>;
