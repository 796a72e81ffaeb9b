//! Peer interest tracking and report propagation.
//!
//! The exchange keeps the static peer table from the node configuration,
//! tracks which peers are interested in which subjects, and pushes locally
//! accepted reports to the peers that care. All sends are fire-and-forget
//! with a per-peer timeout; an unreachable peer is marked, never dropped.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod error;
mod transport;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use vantage_types::{Observation, Peer, Report};
use vantage_wire::{LearnKind, Request};

pub use error::{Error, Result};
pub use transport::{TcpTransport, Transport};

/// Per-peer deadline for a single propagated send.
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// The gossip side of a node: who is out there, and what they care about.
pub struct Exchange {
    me: Peer,
    /// Static peer table, id to address. Never mutated after startup.
    peers: HashMap<String, String>,
    /// subject -> ids of peers that want reports about it
    interest: RwLock<HashMap<String, HashSet<String>>>,
    /// Reachability as of the last ping, by peer id.
    reachable: RwLock<HashMap<String, bool>>,
    transport: Arc<dyn Transport>,
}

impl Exchange {
    /// Create an exchange for `me` against a static peer table.
    #[must_use]
    pub fn new(me: Peer, peers: HashMap<String, String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            me,
            peers,
            interest: RwLock::new(HashMap::new()),
            reachable: RwLock::new(HashMap::new()),
            transport,
        }
    }

    /// This node's identity.
    #[must_use]
    pub fn me(&self) -> &Peer {
        &self.me
    }

    /// The static peer table.
    #[must_use]
    pub fn peers(&self) -> &HashMap<String, String> {
        &self.peers
    }

    /// Ping every configured peer concurrently and record reachability.
    /// Failures only mark the peer; it may come back later.
    pub async fn ping_all(&self) {
        let mut probes = Vec::new();
        for (id, addr) in &self.peers {
            if *id == self.me.id {
                continue;
            }
            let transport = self.transport.clone();
            let request = Request::Ping {
                source: self.me.clone(),
                time: SystemTime::now(),
            };
            let id = id.clone();
            let addr = addr.clone();
            probes.push(tokio::spawn(async move {
                let result = timeout(SEND_TIMEOUT, transport.call(&addr, request)).await;
                let up = matches!(result, Ok(Ok(_)));
                (id, up)
            }));
        }

        let results = futures::future::join_all(probes).await;
        let mut reachable = self.reachable.write().await;
        for result in results {
            match result {
                Ok((id, up)) => {
                    if up {
                        debug!(peer = %id, "peer is reachable");
                    } else {
                        warn!(peer = %id, "peer did not answer ping");
                    }
                    reachable.insert(id, up);
                }
                Err(e) => warn!(error = %e, "ping task failed"),
            }
        }
    }

    /// Reachability snapshot from the last round of pings.
    pub async fn reachable(&self) -> HashMap<String, bool> {
        self.reachable.read().await.clone()
    }

    /// Send a report to every peer currently interested in its subject.
    /// One task per peer, fire-and-forget; failures are logged and drop
    /// the individual send.
    pub async fn propagate(&self, report: &Report) {
        let targets: Vec<String> = {
            let interest = self.interest.read().await;
            match interest.get(&report.subject) {
                Some(ids) => ids.iter().cloned().collect(),
                None => return,
            }
        };
        for id in targets {
            let Some(addr) = self.peers.get(&id).cloned() else {
                debug!(peer = %id, "interested peer not in peer table, skipped");
                continue;
            };
            let request = Request::LearnReport {
                source: self.me.clone(),
                kind: LearnKind::Normal,
                report: report.clone(),
            };
            self.send_to(id, addr, request);
        }
    }

    /// Tell every peer this node wants reports about `subject`.
    pub async fn subscribe(&self, subject: &str) {
        info!(subject, "broadcasting subscription");
        self.broadcast(subject, LearnKind::Subscription);
    }

    /// Tell every peer this node no longer wants reports about `subject`.
    pub async fn unsubscribe(&self, subject: &str) {
        info!(subject, "broadcasting unsubscription");
        self.broadcast(subject, LearnKind::Unsubscription);
    }

    /// Record that a remote peer cares about a subject. Returns whether
    /// this is new information.
    pub async fn interested(&self, peer_id: &str, subject: &str) -> bool {
        self.interest
            .write()
            .await
            .entry(subject.to_string())
            .or_default()
            .insert(peer_id.to_string())
    }

    /// Record that a remote peer no longer cares about a subject.
    pub async fn uninterested(&self, peer_id: &str, subject: &str) {
        let mut interest = self.interest.write().await;
        if let Some(ids) = interest.get_mut(subject) {
            ids.remove(peer_id);
            if ids.is_empty() {
                interest.remove(subject);
            }
        }
    }

    /// Peers currently believed interested in a subject.
    pub async fn interested_peers(&self, subject: &str) -> HashSet<String> {
        self.interest
            .read()
            .await
            .get(subject)
            .cloned()
            .unwrap_or_default()
    }

    fn broadcast(&self, subject: &str, kind: LearnKind) {
        // A subscription notice is a synthetic report bearing only the
        // subject.
        let notice = Report::new(
            self.me.id.clone(),
            subject,
            Observation::new(SystemTime::now()),
        );
        for (id, addr) in &self.peers {
            if *id == self.me.id {
                continue;
            }
            let request = Request::LearnReport {
                source: self.me.clone(),
                kind,
                report: notice.clone(),
            };
            self.send_to(id.clone(), addr.clone(), request);
        }
    }

    fn send_to(&self, id: String, addr: String, request: Request) {
        let transport = self.transport.clone();
        tokio::spawn(async move {
            match timeout(SEND_TIMEOUT, transport.call(&addr, request)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(peer = %id, error = %e, "send to peer failed"),
                Err(_) => warn!(peer = %id, "send to peer timed out"),
            }
        });
    }
}
