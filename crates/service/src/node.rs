//! The node front-end: handle registry, submission and learning paths,
//! queries, the GC loop and lifecycle.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use vantage_decision::SimpleMajority;
use vantage_exchange::{Exchange, TcpTransport, Transport};
use vantage_sink::Sink;
use vantage_sink_fs::FsSink;
use vantage_store::{AcceptCode, HoldBuffer, InferenceStore, ObservationStore};
use vantage_types::{
    Inference, NodeConfig, Panorama, Peer, Registration, Report, View, HANDLE_START,
};
use vantage_wire::{LearnKind, ReportResult};

use crate::{server, Error, Result};

struct Registry {
    registrations: HashMap<u64, Registration>,
    /// Registrations recovered from the sink after a restart. Consulted
    /// when a submission arrives on a handle the active map does not know.
    old_registrations: HashMap<u64, Registration>,
    next_handle: u64,
}

struct ServerState {
    cancel: CancellationToken,
    tracker: TaskTracker,
    accept: JoinHandle<()>,
    gc: Option<JoinHandle<()>>,
    local_addr: SocketAddr,
}

/// One node of the health observation exchange.
///
/// Owns the observation store, the inference store and its worker, the
/// hold buffer, the exchange, and the handle registry. Cheap to clone;
/// clones share the same node.
#[derive(Clone)]
pub struct HealthNode {
    config: Arc<NodeConfig>,
    store: Arc<ObservationStore>,
    inference: Arc<InferenceStore>,
    hold_buffer: Arc<HoldBuffer>,
    exchange: Arc<Exchange>,
    sink: Arc<RwLock<Option<Arc<FsSink>>>>,
    registry: Arc<Mutex<Registry>>,
    state: Arc<Mutex<Option<ServerState>>>,
}

impl HealthNode {
    /// Create a node from its configuration, talking TCP to peers.
    #[must_use]
    pub fn new(config: NodeConfig) -> Self {
        Self::with_transport(config, Arc::new(TcpTransport::default()))
    }

    /// Create a node with a custom peer transport.
    #[must_use]
    pub fn with_transport(config: NodeConfig, transport: Arc<dyn Transport>) -> Self {
        let store = Arc::new(ObservationStore::new(&config.subjects));
        let inference = Arc::new(InferenceStore::new(store.clone(), Arc::new(SimpleMajority)));
        let hold_buffer = Arc::new(HoldBuffer::new(
            config.hold.hold_time(),
            config.hold.hold_list_len(),
        ));
        let me = Peer::new(config.id.clone(), config.addr.clone());
        let exchange = Arc::new(Exchange::new(me, config.peers.clone(), transport));
        Self {
            config: Arc::new(config),
            store,
            inference,
            hold_buffer,
            exchange,
            sink: Arc::new(RwLock::new(None)),
            registry: Arc::new(Mutex::new(Registry {
                registrations: HashMap::new(),
                old_registrations: HashMap::new(),
                next_handle: HANDLE_START,
            })),
            state: Arc::new(Mutex::new(None)),
        }
    }

    /// This node's configuration.
    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// The exchange this node gossips through.
    #[must_use]
    pub fn exchange(&self) -> &Arc<Exchange> {
        &self.exchange
    }

    /// Bind the listener, open the sink, recover old registrations, boot
    /// the inference worker and the GC loop, and ping all peers.
    ///
    /// # Errors
    ///
    /// Fails when the node is already running or the listen address
    /// cannot be bound. A sink that fails to open only disables
    /// persistence.
    pub async fn start(&self) -> Result<SocketAddr> {
        let mut state = self.state.lock().await;
        if state.is_some() {
            return Err(Error::AlreadyStarted);
        }
        let listener = TcpListener::bind(&self.config.addr).await?;
        let local_addr = listener.local_addr()?;
        info!(id = %self.config.id, addr = %local_addr, "health service listening");
        if self.config.dump_mem_usage {
            info!("memory telemetry requested; not collected by this build");
        }

        let sink = Arc::new(FsSink::new(self.config.db_file()));
        match sink.open().await {
            Ok(()) => {
                let dyn_sink: Arc<dyn Sink> = sink.clone();
                self.store.set_sink(dyn_sink.clone()).await;
                self.inference.set_sink(dyn_sink).await;
                match sink.read_registrations().await {
                    Ok(old) => {
                        let mut registry = self.registry.lock().await;
                        // New handles go strictly above anything handed
                        // out before the restart, so a recovered handle
                        // can never be reissued to a new caller.
                        let max_old = old.keys().max().copied().unwrap_or(0);
                        if max_old >= registry.next_handle {
                            registry.next_handle = max_old + 1;
                        }
                        if !old.is_empty() {
                            info!(count = old.len(), "recovered registrations from a prior run");
                        }
                        registry.old_registrations = old;
                    }
                    Err(e) => warn!(error = %e, "failed to read old registrations"),
                }
                *self.sink.write().await = Some(sink);
            }
            Err(e) => warn!(error = %e, "sink failed to open, running without persistence"),
        }

        self.inference.start().await;

        let exchange = self.exchange.clone();
        tokio::spawn(async move { exchange.ping_all().await });

        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        let accept = tokio::spawn(server::serve(
            listener,
            self.clone(),
            cancel.clone(),
            tracker.clone(),
        ));
        let gc = self.config.gc.enable.then(|| self.spawn_gc(cancel.clone()));
        *state = Some(ServerState {
            cancel,
            tracker,
            accept,
            gc,
            local_addr,
        });
        Ok(local_addr)
    }

    /// Stop the node. With `graceful`, in-flight connections are drained
    /// before returning; otherwise they are abandoned.
    ///
    /// # Errors
    ///
    /// Fails when the node was never started.
    pub async fn stop(&self, graceful: bool) -> Result<()> {
        let Some(state) = self.state.lock().await.take() else {
            return Err(Error::NotStarted);
        };
        state.cancel.cancel();
        if let Err(e) = state.accept.await {
            warn!(error = %e, "accept loop did not stop cleanly");
        }
        if let Some(gc) = state.gc {
            if let Err(e) = gc.await {
                warn!(error = %e, "gc loop did not stop cleanly");
            }
        }
        state.tracker.close();
        if graceful {
            state.tracker.wait().await;
        }
        self.inference.stop().await;
        if let Some(sink) = self.sink.write().await.take() {
            if let Err(e) = sink.close().await {
                warn!(error = %e, "sink did not close cleanly");
            }
        }
        info!(id = %self.config.id, "health service stopped");
        Ok(())
    }

    /// The bound listen address, once started.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.state.lock().await.as_ref().map(|s| s.local_addr)
    }

    /// Register a `(module, observer)` pair and return its handle. A
    /// duplicate registration returns the existing handle.
    pub async fn register(&self, module: &str, observer: &str) -> Result<u64> {
        let registration = {
            let mut registry = self.registry.lock().await;
            let mut max_handle = 0;
            for (handle, existing) in &registry.registrations {
                if existing.module == module && existing.observer == observer {
                    debug!(module, observer, handle = existing.handle, "reusing registration");
                    return Ok(existing.handle);
                }
                if *handle > max_handle {
                    max_handle = *handle;
                }
            }
            let handle = if registry.next_handle > max_handle {
                registry.next_handle
            } else {
                max_handle + 1
            };
            let registration = Registration {
                handle,
                module: module.to_string(),
                observer: observer.to_string(),
                time: SystemTime::now(),
            };
            registry.registrations.insert(handle, registration.clone());
            registry.next_handle = handle + 1;
            registration
        };
        // A local observer is a subject of interest itself.
        self.store.add_subject(observer).await;
        info!(module, observer, handle = registration.handle, "registered");
        self.persist_registration(&registration).await;
        Ok(registration.handle)
    }

    /// Ingest a locally submitted report. Local reports are trusted and
    /// never filtered; acceptance triggers analysis and propagation
    /// asynchronously.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidHandle`] when the handle is unknown and
    /// no old registration matches the report's observer.
    pub async fn submit_report(&self, handle: u64, report: Report) -> Result<ReportResult> {
        {
            let mut registry = self.registry.lock().await;
            if !registry.registrations.contains_key(&handle) {
                let restored = match registry.old_registrations.get(&handle) {
                    Some(old) if old.observer == report.observer => Some(old.clone()),
                    Some(old) => {
                        info!(
                            handle,
                            expected = %old.observer,
                            got = %report.observer,
                            "old registration found but observer does not match"
                        );
                        None
                    }
                    None => {
                        debug!(handle, "handle not found in old registrations either");
                        None
                    }
                };
                let Some(old) = restored else {
                    return Err(Error::InvalidHandle);
                };
                info!(handle, observer = %old.observer, "restored a registration from a prior run");
                registry.registrations.insert(handle, old.clone());
                self.store.add_subject(&old.observer).await;
            }
        }

        debug!(subject = %report.subject, "submitting report");
        match self.store.add_report(&report, false).await {
            Ok(AcceptCode::Accepted) => {
                debug!(subject = %report.subject, "accepted local report, analyzing and propagating");
                let node = self.clone();
                let for_analysis = report.clone();
                tokio::spawn(async move { node.analyze_report(for_analysis, true).await });
                let exchange = self.exchange.clone();
                tokio::spawn(async move { exchange.propagate(&report).await });
                Ok(ReportResult::Accepted)
            }
            Ok(AcceptCode::Ignored) => Err(Error::Internal(
                "local report ignored, probably a bug".to_string(),
            )),
            Err(e) => {
                warn!(error = %e, "local report failed ingestion");
                Ok(ReportResult::Failed)
            }
        }
    }

    /// Ingest a report learned from a peer, or handle a subscription
    /// notice.
    pub async fn learn_report(
        &self,
        source: Peer,
        kind: LearnKind,
        report: Report,
    ) -> Result<ReportResult> {
        match kind {
            LearnKind::Normal => {
                debug!(
                    subject = %report.subject,
                    observer = %report.observer,
                    source = %source.id,
                    "learning report"
                );
                match self
                    .store
                    .add_report(&report, self.config.filter_submission)
                    .await
                {
                    Ok(AcceptCode::Accepted) => {
                        self.exchange.interested(&source.id, &report.subject).await;
                        let node = self.clone();
                        tokio::spawn(async move { node.analyze_report(report, false).await });
                        Ok(ReportResult::Accepted)
                    }
                    Ok(AcceptCode::Ignored) => {
                        debug!(subject = %report.subject, source = %source.id, "ignored report, holding");
                        let subject = report.subject.clone();
                        self.hold_buffer.set(&subject, report).await;
                        Ok(ReportResult::Ignored)
                    }
                    Err(e) => {
                        warn!(error = %e, source = %source.id, "learned report failed ingestion");
                        Ok(ReportResult::Failed)
                    }
                }
            }
            LearnKind::Subscription => {
                info!(subject = %report.subject, source = %source.id, "peer subscribed");
                self.exchange.interested(&source.id, &report.subject).await;
                Ok(ReportResult::Accepted)
            }
            LearnKind::Unsubscription => {
                info!(subject = %report.subject, source = %source.id, "peer unsubscribed");
                self.exchange
                    .uninterested(&source.id, &report.subject)
                    .await;
                Ok(ReportResult::Accepted)
            }
        }
    }

    /// Most recent observation about a subject across all observers.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::UnknownSubject`] when nothing is stored.
    pub async fn latest_report(&self, subject: &str) -> Result<Report> {
        self.store
            .latest_report(subject)
            .await
            .ok_or_else(|| Error::UnknownSubject(subject.to_string()))
    }

    /// Everything known about a subject.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::UnknownSubject`] when the subject is unknown.
    pub async fn panorama(&self, subject: &str) -> Result<Panorama> {
        self.store
            .panorama(subject)
            .await
            .ok_or_else(|| Error::UnknownSubject(subject.to_string()))
    }

    /// One observer's view of a subject.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::UnknownSubject`] when the view is unknown.
    pub async fn view(&self, subject: &str, observer: &str) -> Result<View> {
        self.store
            .view(subject, observer)
            .await
            .ok_or_else(|| Error::UnknownSubject(subject.to_string()))
    }

    /// The aggregated verdict about a subject.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::UnknownSubject`] when no inference exists yet.
    pub async fn get_inference(&self, subject: &str) -> Result<Inference> {
        self.inference
            .get_inference(subject)
            .await
            .ok_or_else(|| Error::UnknownSubject(subject.to_string()))
    }

    /// Start watching a subject and tell peers about it. Returns whether
    /// the watch list changed.
    pub async fn observe(&self, subject: &str) -> bool {
        let added = self.store.add_subject(subject).await;
        let exchange = self.exchange.clone();
        let subject = subject.to_string();
        tokio::spawn(async move { exchange.subscribe(&subject).await });
        added
    }

    /// Stop watching a subject, purge its panorama, and tell peers.
    /// Returns whether the subject was being watched.
    pub async fn stop_observing(&self, subject: &str) -> bool {
        let removed = self.store.remove_subject(subject, true).await;
        let exchange = self.exchange.clone();
        let subject = subject.to_string();
        tokio::spawn(async move { exchange.unsubscribe(&subject).await });
        removed
    }

    /// Snapshot of the watch list.
    pub async fn observed_subjects(&self) -> HashMap<String, SystemTime> {
        self.store.subjects().await
    }

    /// Snapshot of all panoramas.
    pub async fn dump_panorama(&self) -> HashMap<String, Panorama> {
        self.store.dump_panorama().await
    }

    /// Snapshot of all inferences.
    pub async fn dump_inference(&self) -> HashMap<String, Inference> {
        self.inference.dump_inference().await
    }

    /// Answer a liveness probe with this node's wall-clock time.
    pub fn ping(&self, source: &Peer, time: SystemTime) -> SystemTime {
        debug!(source = %source.id, time = ?time, "ping");
        SystemTime::now()
    }

    /// The static peer table.
    #[must_use]
    pub fn peers(&self) -> Vec<Peer> {
        self.config
            .peers
            .iter()
            .map(|(id, addr)| Peer::new(id.clone(), addr.clone()))
            .collect()
    }

    /// This node's identity.
    #[must_use]
    pub fn id(&self) -> Peer {
        Peer::new(self.config.id.clone(), self.config.addr.clone())
    }

    /// Revive held reports for a freshly interesting subject and enqueue
    /// inference for the triggering report.
    async fn analyze_report(&self, report: Report, check_hold: bool) {
        if check_hold {
            let held = self.hold_buffer.get(&report.subject).await;
            if !held.is_empty() {
                info!(
                    subject = %report.subject,
                    count = held.len(),
                    "reviving held reports"
                );
                for held_report in held {
                    if let Err(e) = self.store.add_report(&held_report, false).await {
                        error!(
                            observer = %held_report.observer,
                            subject = %held_report.subject,
                            error = %e,
                            "failed to revive held report"
                        );
                    }
                }
                self.hold_buffer.empty(&report.subject).await;
                let exchange = self.exchange.clone();
                let subject = report.subject.clone();
                tokio::spawn(async move { exchange.subscribe(&subject).await });
            }
        }
        self.inference.infer_report_async(&report);
    }

    async fn persist_registration(&self, registration: &Registration) {
        let sink = self.sink.read().await.clone();
        if let Some(sink) = sink {
            if let Err(e) = sink.insert_registration(registration).await {
                warn!(
                    handle = registration.handle,
                    error = %e,
                    "failed to persist registration"
                );
            }
        }
    }

    fn spawn_gc(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let store = self.store.clone();
        let inference = self.inference.clone();
        let frequency = self.config.gc.frequency();
        let threshold = self.config.gc.threshold();
        let relative = self.config.gc.relative;
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + frequency, frequency);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let retired = store.gc(threshold, relative).await;
                        if retired.is_empty() {
                            debug!("no observations retired this gc round");
                        }
                        for (subject, count) in retired {
                            debug!(subject = %subject, count, "retired observations");
                            inference.infer_subject_async(&subject);
                        }
                    }
                    () = cancel.cancelled() => break,
                }
            }
            debug!("gc loop stopped");
        })
    }
}
