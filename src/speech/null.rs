//! Logging no-op backend for platforms without a TTS engine.
//!
//! Keeps the whole pipeline functional in development and CI: utterances are
//! traced instead of spoken, and timing behaves like an instant engine.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use super::{CancelToken, SpeechBackend, Utterance};

pub struct NullBackend {
    rate_wpm: AtomicU32,
    voice: Mutex<Option<String>>,
}

impl NullBackend {
    pub fn new() -> Self {
        Self {
            rate_wpm: AtomicU32::new(200),
            voice: Mutex::new(None),
        }
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechBackend for NullBackend {
    async fn speak(&self, utterance: &Utterance, _cancel: &CancelToken) -> Result<()> {
        debug!(
            "speak [{:?}] {:?}: {}",
            utterance.priority,
            self.rate_wpm.load(Ordering::Relaxed),
            utterance.text
        );
        Ok(())
    }

    fn cancel(&self) {}

    fn set_rate(&self, wpm: u32) -> Result<()> {
        self.rate_wpm.store(wpm, Ordering::Relaxed);
        Ok(())
    }

    fn set_voice(&self, name: &str) -> Result<()> {
        *self.voice.lock().expect("voice lock poisoned") = Some(name.to_string());
        Ok(())
    }

    fn available_voices(&self) -> Vec<String> {
        Vec::new()
    }

    fn is_speaking(&self) -> bool {
        false
    }
}
