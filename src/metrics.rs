//! Pipeline counters for the screen reader core.
//!
//! Thread-safe atomic counters tracking how many keys, events, and utterances
//! flowed through each stage. Counters are cheap enough to update from the
//! input consumer and the speech queue; the keyboard hook itself never
//! touches them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Aggregated counters for one running pipeline instance.
#[derive(Clone, Debug, Default)]
pub struct PipelineMetrics {
    keys_captured: Arc<AtomicU64>,
    keys_dropped: Arc<AtomicU64>,
    events_dispatched: Arc<AtomicU64>,
    utterances_spoken: Arc<AtomicU64>,
    utterances_coalesced: Arc<AtomicU64>,
    backend_errors: Arc<AtomicU64>,
}

/// Point-in-time snapshot of all counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub keys_captured: u64,
    pub keys_dropped: u64,
    pub events_dispatched: u64,
    pub utterances_spoken: u64,
    pub utterances_coalesced: u64,
    pub backend_errors: u64,
}

impl PipelineMetrics {
    /// Creates a new collector with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_key_captured(&self) {
        self.keys_captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_key_dropped(&self) {
        self.keys_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_dispatched(&self) {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_utterance_spoken(&self) {
        self.utterances_spoken.fetch_add(1, Ordering::Relaxed);
    }

    /// Records `n` utterances merged into a single backend call.
    pub fn record_utterances_coalesced(&self, n: u64) {
        self.utterances_coalesced.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_backend_error(&self) {
        self.backend_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of all counters for logging and tests.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            keys_captured: self.keys_captured.load(Ordering::Relaxed),
            keys_dropped: self.keys_dropped.load(Ordering::Relaxed),
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            utterances_spoken: self.utterances_spoken.load(Ordering::Relaxed),
            utterances_coalesced: self.utterances_coalesced.load(Ordering::Relaxed),
            backend_errors: self.backend_errors.load(Ordering::Relaxed),
        }
    }
}
