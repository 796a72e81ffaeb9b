//! Peer identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A participant in the exchange: a stable id plus a dialable address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Peer {
    /// Stable identity of the peer.
    pub id: String,

    /// TCP address the peer listens on.
    pub addr: String,
}

impl Peer {
    /// Create a new peer.
    #[must_use]
    pub fn new(id: impl Into<String>, addr: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            addr: addr.into(),
        }
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.addr)
    }
}
