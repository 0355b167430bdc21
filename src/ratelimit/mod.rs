//! Per-endpoint admission control.
//!
//! Every rate-limited endpoint owns a [`LeakyBucket`]. Sessions fill it by one
//! before running the handler; a background task started by the listener
//! leaks all of them on a fixed interval.

pub mod bucket;

pub use bucket::LeakyBucket;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Leaks every bucket once per `interval` until `shutdown` flips to `true`.
pub fn spawn_leak_driver(
    buckets: Vec<Arc<LeakyBucket>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if buckets.is_empty() {
            return;
        }

        tracing::debug!(buckets = buckets.len(), ?interval, "Leak driver started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !*shutdown.borrow_and_update() {
            tokio::select! {
                _ = ticker.tick() => {
                    for bucket in &buckets {
                        bucket.leak();
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::debug!("Leak driver stopped");
    })
}
