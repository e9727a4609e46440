//! First-run wizard: a speech-only, seven-step setup flow.
//!
//! The wizard reads key events straight from the capture layer, bypassing
//! the mode-aware dispatcher, so its keys never double as navigation. Every
//! prompt and confirmation goes through the normal speech queue. On any
//! normal termination, including a step-1 skip, the settings record is
//! marked first-run-complete and persisted through the settings store.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use crate::input::{vk, KeyEvent};
use crate::settings::{ModifierKey, SettingsHandle, SettingsStore, VerbosityLevel, MAX_WPM, MIN_WPM};
use crate::speech::{Priority, SpeechBackend, SpeechHandle};

/// Step-1 inactivity window before the wizard assumes nobody is there.
pub const WELCOME_TIMEOUT: Duration = Duration::from_secs(30);

const RATE_STEP_WPM: u32 = 10;
const TEST_SENTENCE: &str = "This is how the screen reader will sound.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WizardOutcome {
    Completed,
    Skipped,
}

pub struct FirstRunWizard {
    speech: SpeechHandle,
    backend: Arc<dyn SpeechBackend>,
    settings: SettingsHandle,
    store: Arc<dyn SettingsStore>,
}

impl FirstRunWizard {
    pub fn new(
        speech: SpeechHandle,
        backend: Arc<dyn SpeechBackend>,
        settings: SettingsHandle,
        store: Arc<dyn SettingsStore>,
    ) -> Self {
        Self {
            speech,
            backend,
            settings,
            store,
        }
    }

    /// Runs the wizard to completion, consuming key-downs from `keys`.
    pub async fn run(&self, keys: &mut UnboundedReceiver<KeyEvent>) -> Result<WizardOutcome> {
        info!("First-run wizard started");

        if !self.welcome_step(keys).await {
            self.finish().await?;
            info!("First-run wizard skipped");
            return Ok(WizardOutcome::Skipped);
        }

        self.rate_step(keys).await;
        self.voice_step(keys).await;
        self.verbosity_step(keys).await;
        self.modifier_step(keys).await;
        self.tutorial_step(keys).await;

        self.say("Setup complete. The screen reader is ready to use.");
        self.finish().await?;
        info!("First-run wizard completed");
        Ok(WizardOutcome::Completed)
    }

    /// Step 1. Returns false when the wizard should be skipped.
    async fn welcome_step(&self, keys: &mut UnboundedReceiver<KeyEvent>) -> bool {
        self.say(
            "Welcome to the screen reader. Press Enter to set up speech and \
             navigation, or Escape to skip setup.",
        );
        loop {
            match tokio::time::timeout(WELCOME_TIMEOUT, next_keydown(keys)).await {
                Err(_) => {
                    self.say("No response. Skipping setup.");
                    return false;
                }
                Ok(None) => return false,
                Ok(Some(key)) => match key.vk {
                    vk::RETURN => return true,
                    vk::ESCAPE => return false,
                    _ => {}
                },
            }
        }
    }

    /// Step 2: speech rate in 10 WPM steps within [150, 450].
    async fn rate_step(&self, keys: &mut UnboundedReceiver<KeyEvent>) {
        let mut wpm = self.settings.snapshot().speech_rate_wpm;
        self.say(&format!(
            "Speech rate. Current rate is {wpm} words per minute. \
             Press Up or Down to adjust, Enter to accept."
        ));
        while let Some(key) = next_keydown(keys).await {
            match key.vk {
                vk::UP => wpm = (wpm + RATE_STEP_WPM).min(MAX_WPM),
                vk::DOWN => wpm = wpm.saturating_sub(RATE_STEP_WPM).max(MIN_WPM),
                vk::RETURN | vk::ESCAPE => break,
                _ => continue,
            }
            if let Err(e) = self.backend.set_rate(wpm) {
                warn!("Failed to set speech rate: {e:#}");
            }
            self.say(&format!("{wpm} words per minute. {TEST_SENTENCE}"));
        }
        self.settings.update(|s| s.speech_rate_wpm = wpm);
    }

    /// Step 3: pick a voice from the backend's list.
    async fn voice_step(&self, keys: &mut UnboundedReceiver<KeyEvent>) {
        let voices = self.backend.available_voices();
        if voices.is_empty() {
            self.say("No other voices are available. Moving on.");
            return;
        }
        self.say(&format!(
            "Voice selection. {} voices available. Press Up or Down to \
             try one, Enter to accept.",
            voices.len()
        ));

        let mut index: Option<usize> = None;
        while let Some(key) = next_keydown(keys).await {
            match key.vk {
                vk::DOWN => {
                    index = Some(index.map_or(0, |i| (i + 1) % voices.len()));
                }
                vk::UP => {
                    index = Some(index.map_or(voices.len() - 1, |i| {
                        (i + voices.len() - 1) % voices.len()
                    }));
                }
                vk::RETURN | vk::ESCAPE => break,
                _ => continue,
            }
            let Some(i) = index else { continue };
            let voice = &voices[i];
            if let Err(e) = self.backend.set_voice(voice) {
                warn!("Failed to set voice {voice:?}: {e:#}");
            }
            self.say(&format!("{voice}. {TEST_SENTENCE}"));
        }

        if let Some(i) = index {
            let voice = voices[i].clone();
            self.settings.update(|s| s.voice_name = Some(voice));
        }
    }

    /// Step 4: verbosity profile by number key.
    async fn verbosity_step(&self, keys: &mut UnboundedReceiver<KeyEvent>) {
        self.say(
            "Verbosity. Press 1 for beginner, 2 for intermediate, \
             3 for advanced. Enter keeps the current level.",
        );
        while let Some(key) = next_keydown(keys).await {
            let chosen = match key.vk {
                vk::KEY_1 => Some(VerbosityLevel::Beginner),
                vk::KEY_2 => Some(VerbosityLevel::Intermediate),
                vk::KEY_3 => Some(VerbosityLevel::Advanced),
                vk::RETURN | vk::ESCAPE => break,
                _ => None,
            };
            if let Some(level) = chosen {
                self.settings.update(|s| s.verbosity_level = level);
                let name = match level {
                    VerbosityLevel::Beginner => "Beginner",
                    VerbosityLevel::Intermediate => "Intermediate",
                    VerbosityLevel::Advanced => "Advanced",
                };
                self.say(&format!("{name} verbosity selected."));
            }
        }
    }

    /// Step 5: reader modifier key.
    async fn modifier_step(&self, keys: &mut UnboundedReceiver<KeyEvent>) {
        self.say(
            "Modifier key. Press 1 to use Insert, 2 to use Caps Lock. \
             Enter keeps the current key.",
        );
        while let Some(key) = next_keydown(keys).await {
            let chosen = match key.vk {
                vk::KEY_1 => Some(ModifierKey::Insert),
                vk::KEY_2 => Some(ModifierKey::CapsLock),
                vk::RETURN | vk::ESCAPE => break,
                _ => None,
            };
            if let Some(modifier) = chosen {
                self.settings.update(|s| s.modifier_key = modifier);
                let name = match modifier {
                    ModifierKey::Insert => "Insert",
                    ModifierKey::CapsLock => "Caps Lock",
                };
                self.say(&format!("{name} is now the screen reader key."));
            }
        }
    }

    /// Step 6: a short spoken tutorial.
    async fn tutorial_step(&self, keys: &mut UnboundedReceiver<KeyEvent>) {
        self.say(
            "Quick tutorial. In browse mode, press H to jump between \
             headings, K for links, and D for landmarks. Press the screen \
             reader key plus Space to switch between browse and focus mode. \
             Press the screen reader key plus Down to read continuously. \
             Press Enter to finish setup.",
        );
        while let Some(key) = next_keydown(keys).await {
            if matches!(key.vk, vk::RETURN | vk::ESCAPE) {
                break;
            }
        }
    }

    /// Marks the first run complete and persists the record.
    async fn finish(&self) -> Result<()> {
        self.settings.update(|s| s.first_run_completed = true);
        let snapshot = self.settings.snapshot();
        self.store.persist(&snapshot)?;
        Ok(())
    }

    fn say(&self, text: &str) {
        self.speech.say(text, Priority::Normal);
    }
}

/// Next key-down from the raw stream; `None` when the stream closed.
async fn next_keydown(keys: &mut UnboundedReceiver<KeyEvent>) -> Option<KeyEvent> {
    loop {
        let key = keys.recv().await?;
        if key.pressed {
            return Some(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Modifiers;
    use crate::metrics::PipelineMetrics;
    use crate::settings::Settings;
    use crate::speech::{CancelToken, SpeechQueue, Utterance};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct FakeBackend {
        rate: Mutex<Option<u32>>,
        voice: Mutex<Option<String>>,
        voices: Vec<String>,
    }

    #[async_trait]
    impl SpeechBackend for FakeBackend {
        async fn speak(&self, _utterance: &Utterance, _cancel: &CancelToken) -> Result<()> {
            Ok(())
        }
        fn cancel(&self) {}
        fn set_rate(&self, wpm: u32) -> Result<()> {
            *self.rate.lock().unwrap() = Some(wpm);
            Ok(())
        }
        fn set_voice(&self, name: &str) -> Result<()> {
            *self.voice.lock().unwrap() = Some(name.to_string());
            Ok(())
        }
        fn available_voices(&self) -> Vec<String> {
            self.voices.clone()
        }
        fn is_speaking(&self) -> bool {
            false
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        persisted: Mutex<Option<Settings>>,
    }

    impl SettingsStore for MemoryStore {
        fn persist(&self, settings: &Settings) -> Result<()> {
            *self.persisted.lock().unwrap() = Some(settings.clone());
            Ok(())
        }
    }

    struct Fixture {
        wizard: FirstRunWizard,
        settings: SettingsHandle,
        store: Arc<MemoryStore>,
        backend: Arc<FakeBackend>,
        queue: SpeechQueue,
    }

    fn fixture(voices: Vec<String>) -> Fixture {
        let backend = Arc::new(FakeBackend {
            voices,
            ..Default::default()
        });
        let queue = SpeechQueue::spawn(backend.clone(), PipelineMetrics::new());
        let settings = SettingsHandle::new(Settings::default());
        let store = Arc::new(MemoryStore::default());
        let wizard = FirstRunWizard::new(
            queue.handle(),
            backend.clone(),
            settings.clone(),
            store.clone(),
        );
        Fixture {
            wizard,
            settings,
            store,
            backend,
            queue,
        }
    }

    fn down(vk_code: u32) -> KeyEvent {
        KeyEvent::down(vk_code, Modifiers::empty())
    }

    #[tokio::test]
    async fn escape_at_welcome_skips_and_persists() {
        let mut fx = fixture(Vec::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(down(vk::ESCAPE)).unwrap();

        let outcome = fx.wizard.run(&mut rx).await.unwrap();
        assert_eq!(outcome, WizardOutcome::Skipped);
        assert!(fx.settings.snapshot().first_run_completed);
        assert!(fx.store.persisted.lock().unwrap().is_some());
        fx.queue.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn welcome_inactivity_times_out_into_skip() {
        let mut fx = fixture(Vec::new());
        let (_tx, mut rx) = mpsc::unbounded_channel();

        let outcome = fx.wizard.run(&mut rx).await.unwrap();
        assert_eq!(outcome, WizardOutcome::Skipped);
        assert!(fx.settings.snapshot().first_run_completed);
        fx.queue.dispose().await;
    }

    #[tokio::test]
    async fn full_run_applies_all_choices() {
        let mut fx = fixture(vec!["Alloy".to_string(), "Vale".to_string()]);
        let (tx, mut rx) = mpsc::unbounded_channel();

        tx.send(down(vk::RETURN)).unwrap(); // welcome
        tx.send(down(vk::UP)).unwrap(); // rate 200 -> 210
        tx.send(down(vk::UP)).unwrap(); // rate 210 -> 220
        tx.send(down(vk::RETURN)).unwrap();
        tx.send(down(vk::DOWN)).unwrap(); // first voice
        tx.send(down(vk::DOWN)).unwrap(); // second voice
        tx.send(down(vk::RETURN)).unwrap();
        tx.send(down(vk::KEY_3)).unwrap(); // advanced verbosity
        tx.send(down(vk::RETURN)).unwrap();
        tx.send(down(vk::KEY_2)).unwrap(); // caps lock modifier
        tx.send(down(vk::RETURN)).unwrap();
        tx.send(down(vk::RETURN)).unwrap(); // tutorial

        let outcome = fx.wizard.run(&mut rx).await.unwrap();
        assert_eq!(outcome, WizardOutcome::Completed);

        let settings = fx.settings.snapshot();
        assert_eq!(settings.speech_rate_wpm, 220);
        assert_eq!(settings.voice_name.as_deref(), Some("Vale"));
        assert_eq!(settings.verbosity_level, VerbosityLevel::Advanced);
        assert_eq!(settings.modifier_key, ModifierKey::CapsLock);
        assert!(settings.first_run_completed);

        assert_eq!(*fx.backend.rate.lock().unwrap(), Some(220));
        assert_eq!(fx.backend.voice.lock().unwrap().as_deref(), Some("Vale"));
        let persisted = fx.store.persisted.lock().unwrap().clone().unwrap();
        assert_eq!(persisted, settings.as_ref().clone());
        fx.queue.dispose().await;
    }

    #[tokio::test]
    async fn rate_clamps_at_the_bounds() {
        let mut fx = fixture(Vec::new());
        let (tx, mut rx) = mpsc::unbounded_channel();

        tx.send(down(vk::RETURN)).unwrap();
        for _ in 0..10 {
            tx.send(down(vk::DOWN)).unwrap(); // 200 -> clamp at 150
        }
        tx.send(down(vk::RETURN)).unwrap();
        drop(tx); // remaining steps fall through on channel close

        let outcome = fx.wizard.run(&mut rx).await.unwrap();
        assert_eq!(outcome, WizardOutcome::Completed);
        assert_eq!(fx.settings.snapshot().speech_rate_wpm, MIN_WPM);
        fx.queue.dispose().await;
    }

    #[tokio::test]
    async fn empty_voice_list_skips_voice_step() {
        let mut fx = fixture(Vec::new());
        let (tx, mut rx) = mpsc::unbounded_channel();

        tx.send(down(vk::RETURN)).unwrap(); // welcome
        tx.send(down(vk::RETURN)).unwrap(); // rate accept
        // Voice step emits a prompt but consumes no keys.
        tx.send(down(vk::RETURN)).unwrap(); // verbosity keep
        tx.send(down(vk::RETURN)).unwrap(); // modifier keep
        tx.send(down(vk::RETURN)).unwrap(); // tutorial

        let outcome = fx.wizard.run(&mut rx).await.unwrap();
        assert_eq!(outcome, WizardOutcome::Completed);
        assert_eq!(fx.settings.snapshot().voice_name, None);
        fx.queue.dispose().await;
    }
}
