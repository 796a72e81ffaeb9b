//! Cached per-subject verdicts and the background aggregation worker.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use vantage_decision::DecisionRule;
use vantage_sink::Sink;
use vantage_types::{Inference, Report};

use crate::ObservationStore;

/// Cached inferences plus the worker that recomputes them.
///
/// The worker consumes subject keys from an unbounded queue, snapshots the
/// panorama from a read-only handle to the observation store, applies the
/// decision rule, and persists the result best-effort. Consecutive queued
/// duplicates are coalesced.
pub struct InferenceStore {
    store: Arc<ObservationStore>,
    rule: Arc<dyn DecisionRule>,
    inferences: Arc<RwLock<HashMap<String, Inference>>>,
    sink: Arc<RwLock<Option<Arc<dyn Sink>>>>,
    tx: mpsc::UnboundedSender<String>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl InferenceStore {
    /// Create an inference store reading panoramas from `store` and
    /// aggregating with `rule`.
    #[must_use]
    pub fn new(store: Arc<ObservationStore>, rule: Arc<dyn DecisionRule>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            store,
            rule,
            inferences: Arc::new(RwLock::new(HashMap::new())),
            sink: Arc::new(RwLock::new(None)),
            tx,
            rx: Mutex::new(Some(rx)),
            cancel: CancellationToken::new(),
            worker: Mutex::new(None),
        }
    }

    /// Install the persistence sink used for later inference updates.
    pub async fn set_sink(&self, sink: Arc<dyn Sink>) {
        *self.sink.write().await = Some(sink);
    }

    /// Boot the background worker. Calling twice is a no-op.
    pub async fn start(&self) {
        let Some(mut rx) = self.rx.lock().await.take() else {
            return;
        };
        let store = self.store.clone();
        let rule = self.rule.clone();
        let inferences = self.inferences.clone();
        let sink = self.sink.clone();
        let cancel = self.cancel.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    maybe_subject = rx.recv() => {
                        let Some(subject) = maybe_subject else { break };
                        // Drain whatever queued up behind it, dropping
                        // duplicate keys so a burst of reports about one
                        // subject aggregates once.
                        let mut batch = vec![subject];
                        while let Ok(next) = rx.try_recv() {
                            if !batch.contains(&next) {
                                batch.push(next);
                            }
                        }
                        for subject in batch {
                            recompute(&store, rule.as_ref(), &inferences, &sink, &subject).await;
                        }
                    }
                    () = cancel.cancelled() => break,
                }
            }
            debug!("inference worker stopped");
        });
        *self.worker.lock().await = Some(handle);
    }

    /// Terminate the background worker.
    pub async fn stop(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.worker.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "inference worker did not stop cleanly");
            }
        }
    }

    /// Enqueue recomputation for the subject of a report.
    pub fn infer_report_async(&self, report: &Report) {
        self.infer_subject_async(&report.subject);
    }

    /// Enqueue recomputation for a subject.
    pub fn infer_subject_async(&self, subject: &str) {
        if self.tx.send(subject.to_string()).is_err() {
            warn!(subject, "inference queue closed, recompute dropped");
        }
    }

    /// Recompute a subject's inference right now, returning the result.
    pub async fn infer_now(&self, subject: &str) -> Option<Inference> {
        recompute(
            &self.store,
            self.rule.as_ref(),
            &self.inferences,
            &self.sink,
            subject,
        )
        .await
    }

    /// The current cached inference for a subject.
    pub async fn get_inference(&self, subject: &str) -> Option<Inference> {
        self.inferences.read().await.get(subject).cloned()
    }

    /// Snapshot of all cached inferences.
    pub async fn dump_inference(&self) -> HashMap<String, Inference> {
        self.inferences.read().await.clone()
    }
}

async fn recompute(
    store: &ObservationStore,
    rule: &dyn DecisionRule,
    inferences: &RwLock<HashMap<String, Inference>>,
    sink: &RwLock<Option<Arc<dyn Sink>>>,
    subject: &str,
) -> Option<Inference> {
    let panorama = store.panorama(subject).await?;
    let inference = rule.infer(&panorama)?;
    inferences
        .write()
        .await
        .insert(subject.to_string(), inference.clone());
    let sink = sink.read().await.clone();
    if let Some(sink) = sink {
        if let Err(e) = sink.write_inference(&inference).await {
            warn!(subject, error = %e, "failed to persist inference");
        }
    }
    debug!(subject, observers = inference.observers.len(), "inference updated");
    Some(inference)
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use vantage_decision::SimpleMajority;
    use vantage_types::{Observation, Status};

    use super::*;

    fn report(observer: &str, subject: &str, status: Status, score: f32) -> Report {
        let mut observation = Observation::new(SystemTime::now());
        observation.add_metric("cpu", status, score);
        Report::new(observer, subject, observation)
    }

    fn stores() -> (Arc<ObservationStore>, InferenceStore) {
        let store = Arc::new(ObservationStore::new(&["db".to_string()]));
        let inference = InferenceStore::new(store.clone(), Arc::new(SimpleMajority));
        (store, inference)
    }

    #[tokio::test]
    async fn infer_now_reflects_the_panorama() {
        let (store, inference) = stores();
        store
            .add_report(&report("obs1", "db", Status::Healthy, 90.0), false)
            .await
            .unwrap();

        let result = inference.infer_now("db").await.unwrap();
        let metric = result.observation.get_metric("cpu").unwrap();
        assert_eq!(metric.status, Status::Healthy);
        assert_eq!(metric.score, 90.0);
        assert_eq!(result.observers, vec!["obs1"]);

        assert!(inference.get_inference("db").await.is_some());
        assert!(inference.infer_now("frontend").await.is_none());
    }

    #[tokio::test]
    async fn worker_picks_up_queued_subjects() {
        let (store, inference) = stores();
        inference.start().await;

        store
            .add_report(&report("obs1", "db", Status::Healthy, 90.0), false)
            .await
            .unwrap();
        inference.infer_subject_async("db");

        // The worker runs asynchronously; poll briefly.
        let mut found = None;
        for _ in 0..50 {
            if let Some(result) = inference.get_inference("db").await {
                found = Some(result);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let result = found.expect("worker never produced an inference");
        assert_eq!(result.subject, "db");

        inference.stop().await;
    }

    #[tokio::test]
    async fn accepted_report_invalidates_previous_verdict() {
        let (store, inference) = stores();
        store
            .add_report(&report("obs1", "db", Status::Healthy, 90.0), false)
            .await
            .unwrap();
        inference.infer_now("db").await.unwrap();

        store
            .add_report(&report("obs2", "db", Status::Unhealthy, 10.0), false)
            .await
            .unwrap();
        store
            .add_report(&report("obs3", "db", Status::Unhealthy, 20.0), false)
            .await
            .unwrap();

        let result = inference.infer_now("db").await.unwrap();
        let metric = result.observation.get_metric("cpu").unwrap();
        assert_eq!(metric.status, Status::Unhealthy);
        assert_eq!(metric.score, 15.0);
        assert_eq!(result.observers.len(), 3);
    }

    #[tokio::test]
    async fn inference_persists_through_sink() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(vantage_sink_fs::FsSink::new(dir.path()));
        use vantage_sink::Sink as _;
        sink.open().await.unwrap();

        let (store, inference) = stores();
        inference.set_sink(sink.clone()).await;
        store
            .add_report(&report("obs1", "db", Status::Healthy, 90.0), false)
            .await
            .unwrap();
        inference.infer_now("db").await.unwrap();

        let persisted = sink.read_inference("db").await.unwrap().unwrap();
        assert_eq!(persisted.subject, "db");
    }
}
