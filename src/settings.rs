//! User settings: load, defaults, and the swappable runtime snapshot.
//!
//! Settings live in a single JSON object on disk. A malformed or missing file
//! falls back to built-in defaults rather than failing startup. At runtime
//! every reader sees an immutable `Arc<Settings>` snapshot; writers replace
//! the whole snapshot so no reader ever observes a half-updated record.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::input::vk;

/// How much detail announcements carry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerbosityLevel {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

/// What typed keys echo back as speech.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypingEchoMode {
    None,
    Characters,
    Words,
    #[default]
    Both,
}

/// Which physical key acts as the screen-reader modifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModifierKey {
    #[default]
    Insert,
    CapsLock,
}

impl ModifierKey {
    /// Virtual-key code for the chosen modifier.
    pub fn vk_code(&self) -> u32 {
        match self {
            ModifierKey::Insert => vk::INSERT,
            ModifierKey::CapsLock => vk::CAPITAL,
        }
    }
}

/// The persisted settings record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Settings {
    pub verbosity_level: VerbosityLevel,
    pub speech_rate_wpm: u32,
    pub voice_name: Option<String>,
    pub typing_echo_mode: TypingEchoMode,
    pub audio_cues_enabled: bool,
    pub announce_visited_links: bool,
    pub modifier_key: ModifierKey,
    pub first_run_completed: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            verbosity_level: VerbosityLevel::Beginner,
            speech_rate_wpm: 200,
            voice_name: None,
            typing_echo_mode: TypingEchoMode::Both,
            audio_cues_enabled: true,
            announce_visited_links: true,
            modifier_key: ModifierKey::Insert,
            first_run_completed: false,
        }
    }
}

/// Speech rate bounds in words per minute.
pub const MIN_WPM: u32 = 150;
pub const MAX_WPM: u32 = 450;

impl Settings {
    /// Loads settings from `path`, falling back to defaults when the file is
    /// missing or malformed.
    pub fn load_or_default(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str::<Settings>(&text) {
                Ok(mut settings) => {
                    settings.speech_rate_wpm = settings.speech_rate_wpm.clamp(MIN_WPM, MAX_WPM);
                    info!("Loaded settings from {}", path.display());
                    settings
                }
                Err(e) => {
                    warn!("Settings file {} is malformed ({}), using defaults", path.display(), e);
                    Settings::default()
                }
            },
            Err(_) => {
                info!("No settings file at {}, using defaults", path.display());
                Settings::default()
            }
        }
    }

    /// Writes the record as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write settings to {}", path.display()))?;
        Ok(())
    }

    /// Default per-user settings path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ariavox")
            .join("settings.json")
    }
}

/// Persistence seam for components that update settings (the wizard).
pub trait SettingsStore: Send + Sync {
    fn persist(&self, settings: &Settings) -> Result<()>;
}

/// File-backed store writing the JSON record described above.
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl SettingsStore for JsonSettingsStore {
    fn persist(&self, settings: &Settings) -> Result<()> {
        settings.save(&self.path)
    }
}

/// Shared handle to the current settings snapshot.
///
/// Readers call `snapshot()` and get an `Arc<Settings>` that stays valid even
/// while a writer swaps in a replacement.
#[derive(Clone, Default)]
pub struct SettingsHandle {
    current: Arc<RwLock<Arc<Settings>>>,
}

impl SettingsHandle {
    pub fn new(settings: Settings) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(settings))),
        }
    }

    /// Returns the current immutable snapshot.
    pub fn snapshot(&self) -> Arc<Settings> {
        self.current.read().expect("settings lock poisoned").clone()
    }

    /// Applies `f` to a copy of the current settings and swaps it in.
    pub fn update<F: FnOnce(&mut Settings)>(&self, f: F) {
        let mut guard = self.current.write().expect("settings lock poisoned");
        let mut next = (**guard).clone();
        f(&mut next);
        *guard = Arc::new(next);
    }
}
