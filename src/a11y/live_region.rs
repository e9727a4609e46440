//! Live-region change detection and throttling.
//!
//! The platform only reports that a region changed, never what changed, so
//! the monitor keeps the last known text per source and diffs. Polite
//! announcements are additionally rate-limited per source; assertive ones
//! bypass the throttle entirely.
//!
//! A polite change suppressed by the cooldown does not overwrite the stored
//! text: the region's newest value was never spoken, so the same value must
//! still be able to announce once the cooldown elapses. Only spoken values
//! (and explicit clears) become the diff baseline.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::events::Politeness;

/// Minimum gap between polite announcements from one source.
pub const POLITE_COOLDOWN: Duration = Duration::from_millis(500);

/// Time source seam so tests can drive the throttle deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// The real clock.
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug)]
struct SourceState {
    last_known_text: String,
    last_polite_announcement: Option<Instant>,
}

pub struct LiveRegionMonitor {
    clock: Arc<dyn Clock>,
    sources: Mutex<HashMap<String, SourceState>>,
}

impl LiveRegionMonitor {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(MonotonicClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            sources: Mutex::new(HashMap::new()),
        }
    }

    /// Decides whether a change notification should be spoken.
    ///
    /// Rules, in order: no source id → announce any non-empty text;
    /// unchanged text → no; empty text → recorded but silent; assertive →
    /// yes; polite → only outside the per-source cooldown. A polite change
    /// the cooldown swallows is not recorded, so repeating it after the
    /// cooldown still announces.
    pub fn should_announce(
        &self,
        source_id: Option<&str>,
        text: &str,
        politeness: Politeness,
    ) -> bool {
        let Some(source_id) = source_id else {
            return !text.trim().is_empty();
        };

        let mut sources = self.sources.lock().expect("live-region lock poisoned");
        let state = sources.entry(source_id.to_string()).or_insert_with(|| SourceState {
            last_known_text: String::new(),
            last_polite_announcement: None,
        });

        if text == state.last_known_text {
            return false;
        }

        if text.trim().is_empty() {
            state.last_known_text = text.to_string();
            return false;
        }

        if politeness == Politeness::Assertive {
            state.last_known_text = text.to_string();
            return true;
        }

        let now = self.clock.now();
        if let Some(last) = state.last_polite_announcement {
            if now.duration_since(last) < POLITE_COOLDOWN {
                return false;
            }
        }
        state.last_known_text = text.to_string();
        state.last_polite_announcement = Some(now);
        true
    }

    /// Forgets all per-source state.
    pub fn reset(&self) {
        self.sources
            .lock()
            .expect("live-region lock poisoned")
            .clear();
    }
}

impl Default for LiveRegionMonitor {
    fn default() -> Self {
        Self::new()
    }
}
