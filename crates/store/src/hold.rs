//! TTL cache of ignored reports retained in case interest develops.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use vantage_types::Report;

/// A TTL-indexed, length-bounded cache from subject to held reports.
///
/// Expired entries are pruned lazily at access time.
pub struct HoldBuffer {
    ttl: Duration,
    cap: usize,
    entries: Mutex<HashMap<String, VecDeque<(Instant, Report)>>>,
}

impl HoldBuffer {
    /// Create a buffer holding entries for `ttl`, at most `cap` per subject.
    #[must_use]
    pub fn new(ttl: Duration, cap: usize) -> Self {
        Self {
            ttl,
            cap,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Park a report under its subject, evicting oldest-first past the cap.
    pub async fn set(&self, subject: &str, report: Report) {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let list = entries.entry(subject.to_string()).or_default();
        Self::prune(list, now, self.ttl);
        list.push_back((now, report));
        while list.len() > self.cap {
            list.pop_front();
        }
    }

    /// Non-expired reports held for a subject, oldest first. Entries are
    /// not removed.
    pub async fn get(&self, subject: &str) -> Vec<Report> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.get_mut(subject) {
            Some(list) => {
                Self::prune(list, now, self.ttl);
                list.iter().map(|(_, report)| report.clone()).collect()
            }
            None => Vec::new(),
        }
    }

    /// Clear everything held for a subject.
    pub async fn empty(&self, subject: &str) {
        self.entries.lock().await.remove(subject);
    }

    fn prune(list: &mut VecDeque<(Instant, Report)>, now: Instant, ttl: Duration) {
        while list
            .front()
            .is_some_and(|(inserted, _)| now.duration_since(*inserted) > ttl)
        {
            list.pop_front();
        }
    }
}
