/*!
 * Speech Output Module
 *
 * Utterance model, the pluggable speech backend seam, and the priority
 * queue that drives it.
 */

pub mod null;
pub mod queue;

#[cfg(target_os = "windows")]
pub mod sapi;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Notify;

use crate::audio::Cue;

pub use queue::{SpeechHandle, SpeechQueue};

/// Utterance urgency. Lower value = more urgent; `Interrupt` cancels any
/// in-progress speech before it is spoken.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Interrupt = 0,
    High = 1,
    Normal = 2,
    Low = 3,
}

/// One immutable unit of speech.
#[derive(Clone, Debug, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub priority: Priority,
    pub cue: Option<Cue>,
}

impl Utterance {
    pub fn new(text: impl Into<String>, priority: Priority) -> Self {
        Self {
            text: text.into(),
            priority,
            cue: None,
        }
    }

    pub fn with_cue(mut self, cue: Cue) -> Self {
        self.cue = Some(cue);
        self
    }
}

/// Cancellation token shared between the queue and an in-flight speak call.
///
/// `cancel` is synchronous and idempotent; `cancelled` resolves once for
/// every waiter after the token fires.
#[derive(Default)]
pub struct CancelToken {
    fired: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.fired.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Resolves when the token fires (immediately if it already has).
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        let notified = self.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

/// The TTS engine seam.
///
/// `speak` must be cancellation-aware: when `cancel` fires (or the backend's
/// own `cancel()` is called) an in-progress future resolves promptly.
/// Rate is expressed in words per minute within [150, 450]; the mapping to
/// the engine's native range is backend-specific.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    async fn speak(&self, utterance: &Utterance, cancel: &CancelToken) -> Result<()>;

    /// Synchronously stops any in-progress speech.
    fn cancel(&self);

    fn set_rate(&self, wpm: u32) -> Result<()>;

    fn set_voice(&self, name: &str) -> Result<()>;

    fn available_voices(&self) -> Vec<String>;

    fn is_speaking(&self) -> bool;
}

/// Creates the platform speech backend.
#[cfg(target_os = "windows")]
pub fn create_backend() -> Result<Arc<dyn SpeechBackend>> {
    Ok(Arc::new(sapi::SapiBackend::new()?))
}

/// Creates the platform speech backend.
#[cfg(not(target_os = "windows"))]
pub fn create_backend() -> Result<Arc<dyn SpeechBackend>> {
    Ok(Arc::new(null::NullBackend::new()))
}
