//! Observation types: status, metric, observation, report.

use std::collections::BTreeMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Health status of a single metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Status {
    /// No meaningful verdict could be produced.
    Invalid,
    /// The metric is healthy.
    Healthy,
    /// The metric is unhealthy.
    Unhealthy,
    /// Leaning healthy without a clear majority.
    MaybeHealthy,
    /// Leaning unhealthy without a clear majority.
    MaybeUnhealthy,
    /// The observer has not decided yet.
    Pending,
    /// The subject is in the process of going down.
    Dying,
    /// The subject is considered gone.
    Dead,
}

impl Status {
    /// Shade a definite status into its tentative counterpart.
    ///
    /// Used when a status wins a plurality but not a strict majority.
    #[must_use]
    pub fn to_maybe(self) -> Self {
        match self {
            Self::Healthy => Self::MaybeHealthy,
            Self::Unhealthy => Self::MaybeUnhealthy,
            other => other,
        }
    }
}

/// A single named measurement with a status verdict and a score in [0, 100].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// Metric name, e.g. `cpu` or `disk`.
    pub name: String,

    /// Status verdict for this metric.
    pub status: Status,

    /// Confidence score in [0, 100].
    pub score: f32,
}

/// A timestamped set of metrics reported in one shot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Wall-clock time at which the observation was made.
    pub ts: SystemTime,

    /// Metrics keyed by name.
    pub metrics: BTreeMap<String, Metric>,
}

impl Observation {
    /// Create an empty observation at the given time.
    #[must_use]
    pub fn new(ts: SystemTime) -> Self {
        Self {
            ts,
            metrics: BTreeMap::new(),
        }
    }

    /// Create an observation pre-seeded with the given metric names,
    /// each starting as `Invalid` with a zero score.
    #[must_use]
    pub fn with_metrics(ts: SystemTime, names: &[&str]) -> Self {
        let metrics = names
            .iter()
            .map(|name| {
                (
                    (*name).to_string(),
                    Metric {
                        name: (*name).to_string(),
                        status: Status::Invalid,
                        score: 0.0,
                    },
                )
            })
            .collect();
        Self { ts, metrics }
    }

    /// Set the value of an already-seeded metric. Returns whether the
    /// metric existed.
    pub fn set_metric(&mut self, name: &str, status: Status, score: f32) -> bool {
        match self.metrics.get_mut(name) {
            Some(metric) => {
                metric.status = status;
                metric.score = score;
                true
            }
            None => false,
        }
    }

    /// Insert a metric, creating it if absent.
    pub fn add_metric(&mut self, name: &str, status: Status, score: f32) {
        self.metrics.insert(
            name.to_string(),
            Metric {
                name: name.to_string(),
                status,
                score,
            },
        );
    }

    /// Look up a metric by name.
    #[must_use]
    pub fn get_metric(&self, name: &str) -> Option<&Metric> {
        self.metrics.get(name)
    }
}

/// An immutable record of one observer's take on one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Identity of the reporter.
    pub observer: String,

    /// Identity of the observed entity.
    pub subject: String,

    /// The timestamped metrics.
    pub observation: Observation,
}

impl Report {
    /// Create a new report.
    #[must_use]
    pub fn new(observer: impl Into<String>, subject: impl Into<String>, observation: Observation) -> Self {
        Self {
            observer: observer.into(),
            subject: subject.into(),
            observation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_metrics_start_invalid() {
        let o = Observation::with_metrics(SystemTime::now(), &["cpu", "disk"]);
        assert_eq!(o.metrics.len(), 2);
        assert_eq!(o.get_metric("cpu").unwrap().status, Status::Invalid);
    }

    #[test]
    fn set_metric_only_touches_existing() {
        let mut o = Observation::with_metrics(SystemTime::now(), &["cpu"]);
        assert!(o.set_metric("cpu", Status::Healthy, 90.0));
        assert!(!o.set_metric("network", Status::Healthy, 90.0));
        assert_eq!(o.get_metric("cpu").unwrap().status, Status::Healthy);
        assert!(o.get_metric("network").is_none());
    }

    #[test]
    fn maybe_shading() {
        assert_eq!(Status::Healthy.to_maybe(), Status::MaybeHealthy);
        assert_eq!(Status::Unhealthy.to_maybe(), Status::MaybeUnhealthy);
        assert_eq!(Status::Pending.to_maybe(), Status::Pending);
    }
}
