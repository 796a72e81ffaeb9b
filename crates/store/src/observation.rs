//! The observation store: watch list, panoramas and garbage collection.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::RwLock;
use tracing::{debug, warn};

use vantage_sink::Sink;
use vantage_types::{Panorama, Report, View};

use crate::{Error, Result};

/// Maximum observations retained per `(subject, observer)` view. The
/// oldest drop first once the bound is reached.
pub const MAX_OBSERVATIONS_PER_VIEW: usize = 10;

/// Outcome of ingesting a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptCode {
    /// The report was stored.
    Accepted,
    /// The report was dropped because its subject is not watched.
    Ignored,
}

#[derive(Default)]
struct Inner {
    /// Subjects this node cares about, with observation start times.
    watch_list: HashMap<String, SystemTime>,
    panoramas: HashMap<String, Panorama>,
}

/// In-memory store of all observations this node has accepted.
///
/// A single lock guards the watch list and the subject-indexed panoramas;
/// queries clone snapshots out so nothing holds it during aggregation.
pub struct ObservationStore {
    inner: RwLock<Inner>,
    sink: RwLock<Option<Arc<dyn Sink>>>,
}

impl ObservationStore {
    /// Create a store watching the given initial subjects.
    #[must_use]
    pub fn new(subjects: &[String]) -> Self {
        let now = SystemTime::now();
        let watch_list = subjects
            .iter()
            .map(|subject| (subject.clone(), now))
            .collect();
        Self {
            inner: RwLock::new(Inner {
                watch_list,
                panoramas: HashMap::new(),
            }),
            sink: RwLock::new(None),
        }
    }

    /// Install the persistence sink used for later accepted reports.
    pub async fn set_sink(&self, sink: Arc<dyn Sink>) {
        *self.sink.write().await = Some(sink);
    }

    /// Start watching a subject. Idempotent; records the current time for
    /// new subjects. Returns whether the subject was newly added.
    pub async fn add_subject(&self, subject: &str) -> bool {
        let mut inner = self.inner.write().await;
        if inner.watch_list.contains_key(subject) {
            return false;
        }
        inner
            .watch_list
            .insert(subject.to_string(), SystemTime::now());
        true
    }

    /// Stop watching a subject; with `purge`, drop its panorama too.
    /// Returns whether the subject was being watched.
    pub async fn remove_subject(&self, subject: &str, purge: bool) -> bool {
        let mut inner = self.inner.write().await;
        let removed = inner.watch_list.remove(subject).is_some();
        if purge {
            inner.panoramas.remove(subject);
        }
        removed
    }

    /// Snapshot of the watch list.
    pub async fn subjects(&self) -> HashMap<String, SystemTime> {
        self.inner.read().await.watch_list.clone()
    }

    /// Ingest a report.
    ///
    /// With `filter` set, the report is only accepted when its subject is
    /// already watched; local submissions pass `filter = false` and are
    /// always attempted. The accepted observation is recorded to the sink
    /// best-effort.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedReport`] when the report is missing its
    /// observer, subject or metrics.
    pub async fn add_report(&self, report: &Report, filter: bool) -> Result<AcceptCode> {
        if report.observer.is_empty() {
            return Err(Error::MalformedReport("empty observer"));
        }
        if report.subject.is_empty() {
            return Err(Error::MalformedReport("empty subject"));
        }
        if report.observation.metrics.is_empty() {
            return Err(Error::MalformedReport("no metrics"));
        }

        {
            let mut inner = self.inner.write().await;
            if filter && !inner.watch_list.contains_key(&report.subject) {
                debug!(subject = %report.subject, "report ignored, subject not watched");
                return Ok(AcceptCode::Ignored);
            }
            let panorama = inner
                .panoramas
                .entry(report.subject.clone())
                .or_insert_with(|| Panorama::new(report.subject.clone()));
            let view = panorama
                .views
                .entry(report.observer.clone())
                .or_insert_with(|| View::new(report.observer.clone(), report.subject.clone()));
            insert_ordered(view, report);
        }

        let sink = self.sink.read().await.clone();
        if let Some(sink) = sink {
            if let Err(e) = sink.append_report(report).await {
                warn!(subject = %report.subject, error = %e, "failed to persist report");
            }
        }
        Ok(AcceptCode::Accepted)
    }

    /// The most recent observation about a subject across all observers.
    pub async fn latest_report(&self, subject: &str) -> Option<Report> {
        let inner = self.inner.read().await;
        let panorama = inner.panoramas.get(subject)?;
        panorama
            .views
            .values()
            .filter_map(|view| view.latest().map(|obs| (view, obs)))
            .max_by_key(|(_, obs)| obs.ts)
            .map(|(view, obs)| Report::new(view.observer.clone(), subject, obs.clone()))
    }

    /// Snapshot of everything known about a subject.
    pub async fn panorama(&self, subject: &str) -> Option<Panorama> {
        self.inner.read().await.panoramas.get(subject).cloned()
    }

    /// Snapshot of one observer's view of a subject.
    pub async fn view(&self, subject: &str, observer: &str) -> Option<View> {
        self.inner
            .read()
            .await
            .panoramas
            .get(subject)?
            .views
            .get(observer)
            .cloned()
    }

    /// Snapshot of all panoramas.
    pub async fn dump_panorama(&self) -> HashMap<String, Panorama> {
        self.inner.read().await.panoramas.clone()
    }

    /// Retire observations older than the cutoff.
    ///
    /// With `relative` set, the cutoff for each view is its latest
    /// observation timestamp minus `threshold`; otherwise it is wall-clock
    /// now minus `threshold`. Empty views are removed; empty panoramas
    /// remain so the subject stays on the watch list. Returns retired
    /// counts for the affected subjects.
    pub async fn gc(&self, threshold: Duration, relative: bool) -> HashMap<String, u64> {
        let absolute_cutoff = SystemTime::now().checked_sub(threshold);
        let mut retired = HashMap::new();
        let mut inner = self.inner.write().await;
        for (subject, panorama) in &mut inner.panoramas {
            let mut count: u64 = 0;
            panorama.views.retain(|_, view| {
                let cutoff = if relative {
                    view.latest().and_then(|obs| obs.ts.checked_sub(threshold))
                } else {
                    absolute_cutoff
                };
                if let Some(cutoff) = cutoff {
                    while view
                        .observations
                        .front()
                        .is_some_and(|obs| obs.ts < cutoff)
                    {
                        view.observations.pop_front();
                        count += 1;
                    }
                }
                !view.observations.is_empty()
            });
            if count > 0 {
                retired.insert(subject.clone(), count);
            }
        }
        retired
    }
}

/// Place an observation into a view by timestamp, dropping the oldest
/// entry when the bound is exceeded. An arrival older than the oldest
/// retained observation of a full view is dropped instead.
fn insert_ordered(view: &mut View, report: &Report) {
    let ts = report.observation.ts;
    let pos = view
        .observations
        .iter()
        .rposition(|obs| obs.ts <= ts)
        .map_or(0, |i| i + 1);
    if pos == 0 && view.observations.len() >= MAX_OBSERVATIONS_PER_VIEW {
        debug!(
            observer = %report.observer,
            subject = %report.subject,
            "observation older than full view, dropped"
        );
        return;
    }
    view.observations.insert(pos, report.observation.clone());
    if view.observations.len() > MAX_OBSERVATIONS_PER_VIEW {
        view.observations.pop_front();
    }
}
