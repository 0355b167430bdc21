use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use dashmap::DashMap;
use serde::Serialize;

use crate::metrics::logs::{RequestLog, hours_since_epoch};

/// Status-code counts for one hour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HourlyEntry {
    /// Hours since the Unix epoch
    pub hour: u64,
    pub status_codes: BTreeMap<u16, u64>,
}

/// Counts completed requests per (hour, status code).
///
/// Both levels are concurrent maps, so updates from several tasks and
/// snapshots can interleave freely. Hours older than the retention window
/// are dropped on each update.
#[derive(Debug)]
pub struct HourlyStatusCodeCounter {
    hours_to_keep: u64,
    by_hour: DashMap<u64, Arc<DashMap<u16, u64>>>,
}

impl HourlyStatusCodeCounter {
    pub fn new(hours_to_keep: u64) -> Self {
        Self {
            hours_to_keep,
            by_hour: DashMap::new(),
        }
    }

    pub fn hours_to_keep(&self) -> u64 {
        self.hours_to_keep
    }

    pub fn update(&self, logs: &[RequestLog]) {
        self.update_at(logs, hours_since_epoch(SystemTime::now()));
    }

    /// Counts `logs`, then drops buckets older than `current_hour - hours_to_keep`.
    pub fn update_at(&self, logs: &[RequestLog], current_hour: u64) {
        for log in logs {
            let codes = Arc::clone(&self.by_hour.entry(log.completed_hour()).or_default());
            *codes.entry(log.status).or_insert(0) += 1;
        }

        let cutoff = current_hour.saturating_sub(self.hours_to_keep);
        self.by_hour.retain(|hour, _| *hour >= cutoff);
    }

    pub fn count(&self, hour: u64, status: u16) -> u64 {
        self.by_hour
            .get(&hour)
            .and_then(|codes| codes.get(&status).map(|c| *c))
            .unwrap_or(0)
    }

    /// Point-in-time copy, oldest hour first.
    pub fn snapshot(&self) -> Vec<HourlyEntry> {
        let mut entries: Vec<HourlyEntry> = self
            .by_hour
            .iter()
            .map(|kv| HourlyEntry {
                hour: *kv.key(),
                status_codes: kv.value().iter().map(|c| (*c.key(), *c.value())).collect(),
            })
            .collect();

        entries.sort_by_key(|e| e.hour);
        entries
    }
}
