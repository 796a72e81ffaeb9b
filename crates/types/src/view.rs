//! Aggregation containers: per-observer views and per-subject panoramas.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::report::Observation;

/// Chronological sequence of observations from one observer about one
/// subject, ordered by observation timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct View {
    /// Identity of the reporter.
    pub observer: String,

    /// Identity of the observed entity.
    pub subject: String,

    /// Observations, oldest first.
    pub observations: VecDeque<Observation>,
}

impl View {
    /// Create an empty view.
    #[must_use]
    pub fn new(observer: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            observer: observer.into(),
            subject: subject.into(),
            observations: VecDeque::new(),
        }
    }

    /// The most recent observation, if any.
    #[must_use]
    pub fn latest(&self) -> Option<&Observation> {
        self.observations.back()
    }
}

/// Everything known about one subject: views keyed by observer identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Panorama {
    /// Identity of the observed entity.
    pub subject: String,

    /// Views keyed by observer.
    pub views: HashMap<String, View>,
}

impl Panorama {
    /// Create an empty panorama for a subject.
    #[must_use]
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            views: HashMap::new(),
        }
    }
}
