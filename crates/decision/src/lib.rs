//! Decision rules turning a panorama of views into a verdict.

use std::collections::BTreeMap;
use std::time::SystemTime;

use vantage_types::{Inference, Observation, Panorama, Status};

/// A pure aggregation rule: from all views about a subject, produce the
/// subject-level verdict. Returns `None` when there is nothing to decide.
pub trait DecisionRule: Send + Sync + 'static {
    /// Aggregate the latest observation of every view in the panorama.
    fn infer(&self, panorama: &Panorama) -> Option<Inference>;
}

/// Per-metric majority voting across each observer's latest observation.
///
/// A status holding a strict majority of votes wins outright. A unique
/// plurality short of a majority wins with its tentative shading
/// (`Healthy` becomes `MaybeHealthy`, `Unhealthy` becomes
/// `MaybeUnhealthy`). A tied plurality, including a complete split,
/// yields `Invalid`. The score is the mean of the winning voters' scores
/// (all voters for `Invalid`), rounded to the nearest integer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleMajority;

impl DecisionRule for SimpleMajority {
    fn infer(&self, panorama: &Panorama) -> Option<Inference> {
        let mut latest: Vec<(&str, &Observation)> = panorama
            .views
            .iter()
            .filter_map(|(observer, view)| view.latest().map(|obs| (observer.as_str(), obs)))
            .collect();
        if latest.is_empty() {
            return None;
        }
        latest.sort_by_key(|(observer, _)| *observer);

        // metric name -> (status, score) votes, one per observer
        let mut votes: BTreeMap<&str, Vec<(Status, f32)>> = BTreeMap::new();
        for (_, observation) in &latest {
            for metric in observation.metrics.values() {
                votes
                    .entry(metric.name.as_str())
                    .or_default()
                    .push((metric.status, metric.score));
            }
        }

        let mut aggregated = Observation::new(SystemTime::now());
        for (name, ballots) in votes {
            let (status, score) = decide_metric(&ballots);
            aggregated.add_metric(name, status, score);
        }

        Some(Inference {
            subject: panorama.subject.clone(),
            observers: latest
                .iter()
                .map(|(observer, _)| (*observer).to_string())
                .collect(),
            observation: aggregated,
        })
    }
}

fn decide_metric(ballots: &[(Status, f32)]) -> (Status, f32) {
    let mut tally: BTreeMap<Status, (usize, f32)> = BTreeMap::new();
    for (status, score) in ballots {
        let entry = tally.entry(*status).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += score;
    }

    let best_count = tally.values().map(|(count, _)| *count).max().unwrap_or(0);
    let winners: Vec<Status> = tally
        .iter()
        .filter(|(_, (count, _))| *count == best_count)
        .map(|(status, _)| *status)
        .collect();

    if let [winner] = winners.as_slice() {
        let (count, sum) = tally[winner];
        let mean = sum / count as f32;
        let status = if 2 * count > ballots.len() {
            *winner
        } else {
            winner.to_maybe()
        };
        (status, mean.round())
    } else {
        let total: f32 = ballots.iter().map(|(_, score)| score).sum();
        (Status::Invalid, (total / ballots.len() as f32).round())
    }
}
