//! Browse/Focus mode state machine.
//!
//! Browse mode consumes keys for quick navigation; Focus mode passes them to
//! the application. Every real transition plays the matching earcon, speaks
//! the new mode at interrupt priority, and posts a `ModeChanged` event;
//! no-op transitions stay silent.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::audio::{Cue, CueSink};
use crate::events::{ElementSnapshot, EventKind, EventSink, Mode, ScreenReaderEvent};
use crate::input::keymap::NavigationCommand;
use crate::speech::{Priority, SpeechHandle};

/// Cheap shared view of the current mode; read on every key dispatch.
#[derive(Clone)]
pub struct ModeHandle {
    mode: Arc<AtomicU8>,
}

impl ModeHandle {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode: Arc::new(AtomicU8::new(encode(mode))),
        }
    }

    pub fn current(&self) -> Mode {
        decode(self.mode.load(Ordering::Relaxed))
    }

    fn set(&self, mode: Mode) {
        self.mode.store(encode(mode), Ordering::Relaxed);
    }
}

fn encode(mode: Mode) -> u8 {
    match mode {
        Mode::Browse => 0,
        Mode::Focus => 1,
    }
}

fn decode(value: u8) -> Mode {
    if value == 0 { Mode::Browse } else { Mode::Focus }
}

pub struct ModeManager {
    handle: ModeHandle,
    cues: Arc<dyn CueSink>,
    speech: SpeechHandle,
    sink: Arc<dyn EventSink>,
}

impl ModeManager {
    pub fn new(cues: Arc<dyn CueSink>, speech: SpeechHandle, sink: Arc<dyn EventSink>) -> Self {
        Self {
            handle: ModeHandle::new(Mode::Browse),
            cues,
            speech,
            sink,
        }
    }

    pub fn handle(&self) -> ModeHandle {
        self.handle.clone()
    }

    pub fn current(&self) -> Mode {
        self.handle.current()
    }

    /// The mode-toggle chord.
    pub fn toggle(&self) {
        let next = match self.current() {
            Mode::Browse => Mode::Focus,
            Mode::Focus => Mode::Browse,
        };
        self.switch_to(next, "toggle command");
    }

    /// Activation of an element: entering an edit field flips to Focus. The
    /// activation itself still proceeds downstream.
    pub fn on_activate_element(&self, is_edit_field: bool) {
        if self.current() == Mode::Browse && is_edit_field {
            self.switch_to(Mode::Focus, "activated an edit field");
        }
    }

    /// Focus landed on a new element: leaving the form-field world drops
    /// back to Browse.
    pub fn on_focus_changed(&self, element: &ElementSnapshot) {
        if self.current() == Mode::Focus && !is_form_field_snapshot(element) {
            self.switch_to(Mode::Browse, "focus left the form field");
        }
    }

    /// Whether `command` is swallowed in the current mode. Focus mode
    /// blocks navigation except the toggle chord, speech stop, and element
    /// activation.
    pub fn blocks(&self, command: NavigationCommand) -> bool {
        self.current() == Mode::Focus
            && !matches!(
                command,
                NavigationCommand::ToggleMode
                    | NavigationCommand::StopSpeech
                    | NavigationCommand::ActivateElement
            )
    }

    fn switch_to(&self, mode: Mode, reason: &str) {
        if self.current() == mode {
            return;
        }
        self.handle.set(mode);
        debug!("Mode -> {:?} ({reason})", mode);

        let (cue, text) = match mode {
            Mode::Browse => (Cue::BrowseMode, "Browse mode"),
            Mode::Focus => (Cue::FocusMode, "Focus mode"),
        };
        self.cues.play(cue);
        self.speech.say(text, Priority::Interrupt);
        self.sink.post(ScreenReaderEvent::now(EventKind::ModeChanged {
            mode,
            reason: reason.to_string(),
        }));
    }
}

/// Form-field test over a focus snapshot: the fixed control-type set, or
/// anything focusable enough to take typed input.
fn is_form_field_snapshot(element: &ElementSnapshot) -> bool {
    crate::a11y::is_form_field_type(&element.control_type)
}
