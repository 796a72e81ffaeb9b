//! Node configuration.
//!
//! Field names are renamed to match the JSON configuration format the
//! deployment tooling writes (`Id`, `Peers`, `GCConfig`, ...).

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Database file used when the config leaves `DBFile` empty.
pub const DEFAULT_DB_FILE: &str = "vantage.db";

/// Garbage collection control.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct GcConfig {
    /// Whether the background GC loop runs at all.
    pub enable: bool,

    /// Seconds between GC rounds. Zero means use the built-in default.
    pub frequency: u64,

    /// Observations older than this many seconds are retired. Zero means
    /// use the built-in default.
    pub threshold: u64,

    /// Cutoff relative to each view's latest observation rather than
    /// wall-clock now.
    pub relative: bool,
}

impl GcConfig {
    /// Default seconds between GC rounds.
    pub const DEFAULT_FREQUENCY: Duration = Duration::from_secs(3 * 60);

    /// Default retirement threshold.
    pub const DEFAULT_THRESHOLD: Duration = Duration::from_secs(5 * 60);

    /// The configured frequency, falling back to the default when unset.
    #[must_use]
    pub fn frequency(&self) -> Duration {
        if self.frequency > 0 {
            Duration::from_secs(self.frequency)
        } else {
            Self::DEFAULT_FREQUENCY
        }
    }

    /// The configured threshold, falling back to the default when the
    /// frequency was unset (both fall back together, as a pair).
    #[must_use]
    pub fn threshold(&self) -> Duration {
        if self.frequency > 0 {
            Duration::from_secs(self.threshold)
        } else {
            Self::DEFAULT_THRESHOLD
        }
    }
}

/// Hold-buffer control for ignored reports.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct HoldConfig {
    /// Seconds an ignored report is held. Zero means use the default.
    pub hold_time: u64,

    /// Maximum held reports per subject. Only consulted when `HoldTime`
    /// is set.
    pub hold_list_len: usize,
}

impl HoldConfig {
    /// Default hold duration for ignored reports.
    pub const DEFAULT_HOLD_TIME: Duration = Duration::from_secs(3 * 60);

    /// Default per-subject cap on held reports.
    pub const DEFAULT_HOLD_LIST_LEN: usize = 60;

    /// The configured hold TTL, falling back to the default when unset.
    #[must_use]
    pub fn hold_time(&self) -> Duration {
        if self.hold_time > 0 {
            Duration::from_secs(self.hold_time)
        } else {
            Self::DEFAULT_HOLD_TIME
        }
    }

    /// The configured per-subject cap, falling back to the default when
    /// the TTL was unset.
    #[must_use]
    pub fn hold_list_len(&self) -> usize {
        if self.hold_time > 0 {
            self.hold_list_len
        } else {
            Self::DEFAULT_HOLD_LIST_LEN
        }
    }
}

/// Configuration for one node of the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NodeConfig {
    /// This peer's identity. Must be a key of `peers` when a peer table
    /// is supplied.
    pub id: String,

    /// TCP listen address.
    pub addr: String,

    /// Static peer table, id to address.
    pub peers: HashMap<String, String>,

    /// Initial watch list.
    pub subjects: Vec<String>,

    /// Whether learned reports require watch-list membership. Local
    /// submissions are never filtered.
    pub filter_submission: bool,

    /// Persistent store path. Empty means [`DEFAULT_DB_FILE`].
    #[serde(rename = "DBFile")]
    pub db_file: String,

    /// Logging threshold, e.g. `info` or `vantage=debug`.
    pub log_level: String,

    /// Garbage collection control.
    #[serde(rename = "GCConfig")]
    pub gc: GcConfig,

    /// Hold-buffer control.
    #[serde(rename = "BufConfig")]
    pub hold: HoldConfig,

    /// Periodic memory telemetry. Accepted for config compatibility;
    /// currently only acknowledged in the log.
    pub dump_mem_usage: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            addr: String::new(),
            peers: HashMap::new(),
            subjects: Vec::new(),
            filter_submission: false,
            db_file: DEFAULT_DB_FILE.to_string(),
            log_level: String::new(),
            gc: GcConfig::default(),
            hold: HoldConfig::default(),
            dump_mem_usage: false,
        }
    }
}

impl NodeConfig {
    /// Load a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// The database file to use, applying the default for empty values.
    #[must_use]
    pub fn db_file(&self) -> &str {
        if self.db_file.is_empty() {
            DEFAULT_DB_FILE
        } else {
            &self.db_file
        }
    }
}
