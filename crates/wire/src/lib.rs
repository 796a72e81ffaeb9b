//! Request/response shapes and framing for the vantage exchange protocol.
//!
//! Every message is a CBOR-encoded enum framed with a u32 big-endian
//! length prefix. The same surface serves local clients and peers; peers
//! only ever send `LearnReport` and `Ping`.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod error;
mod frame;

use std::collections::HashMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use vantage_types::{Inference, Panorama, Peer, Report, View};

pub use error::Error;
pub use frame::{read_frame, write_frame, MAX_FRAME_SIZE};

/// Result type for wire operations.
pub type Result<T> = std::result::Result<T, Error>;

/// How a learned report should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LearnKind {
    /// An ordinary propagated report.
    Normal,
    /// The source wants reports about the carried subject.
    Subscription,
    /// The source no longer wants reports about the carried subject.
    Unsubscription,
}

/// Reply status of a liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PingStatus {
    /// The node is alive and answering.
    Good,
}

/// Outcome of a submitted or learned report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportResult {
    /// The report was stored.
    Accepted,
    /// The report was dropped for lack of interest.
    Ignored,
    /// The report was structurally unusable.
    Failed,
}

/// A request to a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    /// Register a local module and obtain a submission handle.
    Register {
        /// Name of the registering module.
        module: String,
        /// Observer identity the module reports as.
        observer: String,
    },
    /// Submit a locally observed report.
    SubmitReport {
        /// Handle returned by `Register`.
        handle: u64,
        /// The report.
        report: Report,
    },
    /// Learn a report from a peer.
    LearnReport {
        /// The sending peer.
        source: Peer,
        /// How to interpret the report.
        kind: LearnKind,
        /// The report; subscription notices carry only the subject.
        report: Report,
    },
    /// Most recent observation about a subject across all observers.
    GetLatestReport {
        /// The subject queried.
        subject: String,
    },
    /// Everything known about a subject.
    GetPanorama {
        /// The subject queried.
        subject: String,
    },
    /// One observer's view of a subject.
    GetView {
        /// The subject queried.
        subject: String,
        /// The observer queried.
        observer: String,
    },
    /// The aggregated verdict about a subject.
    GetInference {
        /// The subject queried.
        subject: String,
    },
    /// Start watching a subject.
    Observe {
        /// The subject to watch.
        subject: String,
    },
    /// Stop watching a subject and purge its panorama.
    StopObserving {
        /// The subject to drop.
        subject: String,
    },
    /// Snapshot of the watch list.
    GetObservedSubjects,
    /// Snapshot of all panoramas.
    DumpPanorama,
    /// Snapshot of all inferences.
    DumpInference,
    /// Liveness probe.
    Ping {
        /// The sending peer.
        source: Peer,
        /// The sender's wall-clock time.
        time: SystemTime,
    },
    /// The node's static peer table.
    GetPeers,
    /// The node's own identity.
    GetId,
}

/// A reply from a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    /// Reply to `Register`.
    Handle {
        /// The assigned submission handle.
        handle: u64,
    },
    /// Reply to `SubmitReport` and `LearnReport`.
    Outcome {
        /// What happened to the report.
        result: ReportResult,
    },
    /// Reply to `GetLatestReport`.
    Report(Report),
    /// Reply to `GetPanorama`.
    Panorama(Panorama),
    /// Reply to `GetView`.
    View(View),
    /// Reply to `GetInference`.
    Inference(Inference),
    /// Reply to `Observe` / `StopObserving`.
    Success {
        /// Whether the watch list changed.
        success: bool,
    },
    /// Reply to `GetObservedSubjects`.
    Subjects(HashMap<String, SystemTime>),
    /// Reply to `DumpPanorama`.
    Panoramas(HashMap<String, Panorama>),
    /// Reply to `DumpInference`.
    Inferences(HashMap<String, Inference>),
    /// Reply to `Ping`.
    Pong {
        /// Whether the node considers itself healthy.
        result: PingStatus,
        /// The replying node's wall-clock time.
        time: SystemTime,
    },
    /// Reply to `GetPeers`.
    Peers(Vec<Peer>),
    /// Reply to `GetId`.
    Id(Peer),
    /// Any failure, carried as a human-readable message.
    Error {
        /// What went wrong.
        message: String,
    },
}
