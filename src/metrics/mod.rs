//! Request outcome metrics.
//!
//! Sessions push a [`RequestLog`] per completed exchange into
//! [`ServerMetrics`]; a periodic task folds the pending logs into the
//! [`HourlyStatusCodeCounter`]. [`ServerMetrics::report`] is safe to call at
//! any time.

pub mod counter;
pub mod logs;

pub use counter::{HourlyEntry, HourlyStatusCodeCounter};
pub use logs::{RequestLog, RequestLogs};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug)]
pub struct ServerMetrics {
    open_connections: AtomicUsize,
    total_requests: AtomicU64,
    logs: RequestLogs,
    status_codes: HourlyStatusCodeCounter,
}

/// Serializable view of [`ServerMetrics`].
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub open_connections: usize,
    pub total_requests: u64,
    pub hourly_status_codes: Vec<HourlyEntry>,
}

impl ServerMetrics {
    pub fn new(hours_to_keep: u64) -> Self {
        Self {
            open_connections: AtomicUsize::new(0),
            total_requests: AtomicU64::new(0),
            logs: RequestLogs::new(),
            status_codes: HourlyStatusCodeCounter::new(hours_to_keep),
        }
    }

    /// Counts an open connection until the returned guard is dropped.
    pub fn connection_opened(self: &Arc<Self>) -> ConnectionGuard {
        self.open_connections.fetch_add(1, Ordering::Relaxed);
        ConnectionGuard {
            metrics: Arc::clone(self),
        }
    }

    pub fn open_connections(&self) -> usize {
        self.open_connections.load(Ordering::Relaxed)
    }

    pub fn record(&self, log: RequestLog) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.logs.push(log);
    }

    /// Moves pending logs into the hourly counter.
    pub fn flush(&self) {
        let logs = self.logs.drain();
        self.status_codes.update(&logs);
    }

    pub fn status_codes(&self) -> &HourlyStatusCodeCounter {
        &self.status_codes
    }

    pub fn pending_logs(&self) -> &RequestLogs {
        &self.logs
    }

    pub fn report(&self) -> MetricsReport {
        MetricsReport {
            open_connections: self.open_connections(),
            total_requests: self.total_requests.load(Ordering::Relaxed),
            hourly_status_codes: self.status_codes.snapshot(),
        }
    }
}

pub struct ConnectionGuard {
    metrics: Arc<ServerMetrics>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.metrics.open_connections.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Flushes `metrics` every `interval` until `shutdown` flips to `true`,
/// with one last flush on the way out.
pub fn spawn_aggregator(
    metrics: Arc<ServerMetrics>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        while !*shutdown.borrow_and_update() {
            tokio::select! {
                _ = ticker.tick() => metrics.flush(),
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        metrics.flush();
    })
}
