//! Pipeline counters.
//!
//! The pipeline reports through [`MetricsRecorder`]; exposition backends (for
//! example the Prometheus recorder in `eventrelay-prometheus`) implement it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Sink for pipeline counters.
pub trait MetricsRecorder: Send + Sync + std::fmt::Debug {
    /// An event passed admission and entered enrichment.
    fn event_sent(&self);
    /// A live event was discarded for exceeding the maximum age.
    fn event_discarded(&self);
    /// The event source reported a watch error.
    fn watch_error(&self);
    /// A sink failed to deliver an event.
    fn send_error(&self, receiver: &str);
    /// A receiver queue was full and the event was dropped.
    fn event_dropped(&self, receiver: &str);
}

/// Recorder that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsRecorder for NoopMetrics {
    fn event_sent(&self) {}
    fn event_discarded(&self) {}
    fn watch_error(&self) {}
    fn send_error(&self, _receiver: &str) {}
    fn event_dropped(&self, _receiver: &str) {}
}

/// Point-in-time copy of [`AtomicMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub events_sent: u64,
    pub events_discarded: u64,
    pub watch_errors: u64,
    pub send_errors: HashMap<String, u64>,
    pub events_dropped: HashMap<String, u64>,
}

impl MetricsSnapshot {
    pub fn send_errors_for(&self, receiver: &str) -> u64 {
        self.send_errors.get(receiver).copied().unwrap_or_default()
    }

    pub fn dropped_for(&self, receiver: &str) -> u64 {
        self.events_dropped.get(receiver).copied().unwrap_or_default()
    }
}

/// In-process counters.
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    events_sent: AtomicU64,
    events_discarded: AtomicU64,
    watch_errors: AtomicU64,
    send_errors: Mutex<HashMap<String, u64>>,
    events_dropped: Mutex<HashMap<String, u64>>,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_sent: self.events_sent.load(Ordering::Relaxed),
            events_discarded: self.events_discarded.load(Ordering::Relaxed),
            watch_errors: self.watch_errors.load(Ordering::Relaxed),
            send_errors: self.send_errors.lock().unwrap_or_else(|e| e.into_inner()).clone(),
            events_dropped: self.events_dropped.lock().unwrap_or_else(|e| e.into_inner()).clone(),
        }
    }

    fn bump(map: &Mutex<HashMap<String, u64>>, receiver: &str) {
        let mut guard = map.lock().unwrap_or_else(|e| e.into_inner());
        *guard.entry(receiver.to_string()).or_default() += 1;
    }
}

impl MetricsRecorder for AtomicMetrics {
    fn event_sent(&self) {
        self.events_sent.fetch_add(1, Ordering::Relaxed);
    }

    fn event_discarded(&self) {
        self.events_discarded.fetch_add(1, Ordering::Relaxed);
    }

    fn watch_error(&self) {
        self.watch_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn send_error(&self, receiver: &str) {
        Self::bump(&self.send_errors, receiver);
    }

    fn event_dropped(&self, receiver: &str) {
        Self::bump(&self.events_dropped, receiver);
    }
}
