use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::http::request::Method;

/// One completed request/response exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLog {
    pub remote_addr: SocketAddr,
    /// `None` when the request line could not be parsed
    pub method: Option<Method>,
    pub path: String,
    pub status: u16,
    pub elapsed: Duration,
    pub completed_on: SystemTime,
}

impl RequestLog {
    /// Whole hours since the Unix epoch at completion.
    pub fn completed_hour(&self) -> u64 {
        hours_since_epoch(self.completed_on)
    }
}

pub fn hours_since_epoch(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() / 3600)
        .unwrap_or(0)
}

/// Logs written by sessions and drained by the aggregation task.
#[derive(Debug, Default)]
pub struct RequestLogs {
    pending: Mutex<Vec<RequestLog>>,
}

impl RequestLogs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, log: RequestLog) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(log);
    }

    /// Takes everything logged since the previous drain.
    pub fn drain(&self) -> Vec<RequestLog> {
        std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
