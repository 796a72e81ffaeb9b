//! Module registrations and submission handles.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Lowest handle value a node will ever assign.
pub const HANDLE_START: u64 = 10000;

/// A registered `(module, observer)` pair and its submission handle.
///
/// Registrations are persisted so that a restarted node can re-authorize
/// submissions from observers it had handed handles to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    /// The handle assigned to the pair.
    pub handle: u64,

    /// Name of the registering module.
    pub module: String,

    /// Observer identity the module reports as.
    pub observer: String,

    /// When the registration was made.
    pub time: SystemTime,
}
