/*!
 * Audio Cue Module
 *
 * Fire-and-forget playback of short pre-loaded earcons. A dedicated thread
 * owns the output device and the decoded sources; `play` just posts the cue
 * name to that thread. A missing device, a missing asset, or a disabled
 * player all degrade to a silent no-op.
 */

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Mutex;

use rodio::source::{Buffered, Source};
use rodio::{Decoder, OutputStream, Sink};
use tracing::{debug, warn};

/// The named earcons the core plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Cue {
    BrowseMode,
    FocusMode,
    Boundary,
    Wrap,
    Error,
}

impl Cue {
    /// Asset file stem on disk (`<stem>.wav`).
    pub fn asset_name(&self) -> &'static str {
        match self {
            Cue::BrowseMode => "browse_mode",
            Cue::FocusMode => "focus_mode",
            Cue::Boundary => "boundary",
            Cue::Wrap => "wrap",
            Cue::Error => "error",
        }
    }

    pub const ALL: [Cue; 5] = [
        Cue::BrowseMode,
        Cue::FocusMode,
        Cue::Boundary,
        Cue::Wrap,
        Cue::Error,
    ];
}

/// Cue playback seam. Implementors must not block the caller.
pub trait CueSink: Send + Sync {
    fn play(&self, cue: Cue);
}

type LoadedSource = Buffered<Decoder<Cursor<Vec<u8>>>>;

/// Plays pre-loaded wave assets on a dedicated audio thread.
pub struct CuePlayer {
    tx: Sender<Cue>,
    enabled: AtomicBool,
}

impl CuePlayer {
    /// Loads the named assets from `assets_dir` and opens the output device.
    ///
    /// Never fails: missing files and a missing output device are logged and
    /// tolerated; affected cues become no-ops.
    pub fn new(assets_dir: &Path, enabled: bool) -> Self {
        let (tx, rx) = mpsc::channel::<Cue>();
        let dir = assets_dir.to_path_buf();

        std::thread::Builder::new()
            .name("ariavox-audio".to_string())
            .spawn(move || audio_thread(dir, rx))
            .map_err(|e| warn!("Failed to start audio thread: {e}"))
            .ok();

        Self {
            tx,
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }
}

impl CueSink for CuePlayer {
    fn play(&self, cue: Cue) {
        if !self.is_enabled() {
            return;
        }
        // Audio thread gone means no device; silently do nothing.
        let _ = self.tx.send(cue);
    }
}

fn audio_thread(assets_dir: PathBuf, rx: mpsc::Receiver<Cue>) {
    let output = match OutputStream::try_default() {
        Ok(pair) => Some(pair),
        Err(e) => {
            warn!("No audio output device, cues disabled: {e}");
            None
        }
    };

    let mut sounds: HashMap<Cue, LoadedSource> = HashMap::new();
    for cue in Cue::ALL {
        let path = assets_dir.join(format!("{}.wav", cue.asset_name()));
        match load_source(&path) {
            Ok(source) => {
                sounds.insert(cue, source);
            }
            Err(e) => debug!("Cue {:?} unavailable ({e}); it will be silent", cue),
        }
    }

    // Exits when every CuePlayer clone of the sender is dropped.
    while let Ok(cue) = rx.recv() {
        let Some((_stream, handle)) = output.as_ref() else { continue };
        let Some(source) = sounds.get(&cue) else { continue };
        match Sink::try_new(handle) {
            Ok(sink) => {
                sink.append(source.clone());
                sink.detach();
            }
            Err(e) => debug!("Cue playback failed: {e}"),
        }
    }
}

fn load_source(path: &Path) -> anyhow::Result<LoadedSource> {
    let bytes = std::fs::read(path)?;
    let decoder = Decoder::new(Cursor::new(bytes))?;
    Ok(decoder.buffered())
}

/// Records cue names instead of playing them. Used by tests and by the
/// dry-run mode of the wizard.
#[derive(Default)]
pub struct RecordingCueSink {
    played: Mutex<Vec<Cue>>,
}

impl RecordingCueSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn played(&self) -> Vec<Cue> {
        self.played.lock().expect("cue lock poisoned").clone()
    }

    pub fn clear(&self) {
        self.played.lock().expect("cue lock poisoned").clear();
    }
}

impl CueSink for RecordingCueSink {
    fn play(&self, cue: Cue) {
        self.played.lock().expect("cue lock poisoned").push(cue);
    }
}
