//! Typing echo: speaks characters and/or words as the user types.
//!
//! Keeps a small rolling word buffer. Characters are echoed on key-up (so
//! held keys do not stutter); word echo fires when a boundary key (Enter,
//! Space, or sentence punctuation) completes the buffered word. Symbols get
//! spoken names so "@" reads as "at" rather than silence.

use std::sync::Arc;

use crate::events::{EventKind, EventSink, ScreenReaderEvent};
use crate::input::{vk, KeyEvent, Modifiers};
use crate::settings::{SettingsHandle, TypingEchoMode};

/// Keys that complete a word.
const BOUNDARY_KEYS: [u32; 6] = [
    vk::RETURN,
    vk::SPACE,
    vk::OEM_COMMA,
    vk::OEM_PERIOD,
    vk::OEM_1,
    vk::OEM_2,
];

pub struct TypingEchoHandler {
    buffer: String,
    settings: SettingsHandle,
    sink: Arc<dyn EventSink>,
}

impl TypingEchoHandler {
    pub fn new(settings: SettingsHandle, sink: Arc<dyn EventSink>) -> Self {
        Self {
            buffer: String::new(),
            settings,
            sink,
        }
    }

    /// Feeds one raw key event through the echo rules.
    pub fn handle_key(&mut self, event: KeyEvent) {
        let mode = self.settings.snapshot().typing_echo_mode;
        if mode == TypingEchoMode::None {
            self.buffer.clear();
            return;
        }

        if event.pressed {
            if event.vk == vk::BACK || event.vk == vk::DELETE {
                self.buffer.pop();
            }
            return;
        }

        if BOUNDARY_KEYS.contains(&event.vk) {
            if matches!(mode, TypingEchoMode::Words | TypingEchoMode::Both)
                && !self.buffer.is_empty()
            {
                let word = std::mem::take(&mut self.buffer);
                self.emit(word, true);
            }
            self.buffer.clear();
            if matches!(mode, TypingEchoMode::Characters | TypingEchoMode::Both) {
                self.emit(boundary_key_name(event.vk).to_string(), false);
            }
            return;
        }

        let shift = event.modifiers.contains(Modifiers::SHIFT);
        if let Some(ch) = vk_to_char(event.vk, shift) {
            self.buffer.push(ch);
            if matches!(mode, TypingEchoMode::Characters | TypingEchoMode::Both) {
                self.emit(char_name(ch), false);
            }
        }
    }

    /// Current buffered word; useful for tests and for flush-on-blur.
    pub fn pending_word(&self) -> &str {
        &self.buffer
    }

    fn emit(&self, text: String, is_word: bool) {
        self.sink
            .post(ScreenReaderEvent::now(EventKind::TypingEcho { text, is_word }));
    }
}

/// Maps a virtual key to the character it types, honoring shift for letters
/// and the number row. Returns `None` for non-printable keys.
fn vk_to_char(vk_code: u32, shift: bool) -> Option<char> {
    match vk_code {
        vk::KEY_A..=vk::KEY_Z => {
            let ch = (b'a' + (vk_code - vk::KEY_A) as u8) as char;
            Some(if shift { ch.to_ascii_uppercase() } else { ch })
        }
        vk::KEY_0..=vk::KEY_9 => {
            let digit = (vk_code - vk::KEY_0) as usize;
            if shift {
                Some(SHIFTED_DIGITS[digit])
            } else {
                Some((b'0' + digit as u8) as char)
            }
        }
        vk::NUMPAD_0..=vk::NUMPAD_9 => Some((b'0' + (vk_code - vk::NUMPAD_0) as u8) as char),
        vk::MULTIPLY => Some('*'),
        vk::ADD => Some('+'),
        vk::SUBTRACT => Some('-'),
        vk::DECIMAL => Some('.'),
        vk::DIVIDE => Some('/'),
        vk::OEM_PLUS => Some(if shift { '+' } else { '=' }),
        vk::OEM_MINUS => Some(if shift { '_' } else { '-' }),
        vk::OEM_3 => Some(if shift { '~' } else { '`' }),
        _ => None,
    }
}

/// Shifted number-row characters, indexed by digit.
const SHIFTED_DIGITS: [char; 10] = [')', '!', '@', '#', '$', '%', '^', '&', '*', '('];

/// Spoken name for a typed character.
fn char_name(ch: char) -> String {
    match ch {
        '@' => "at".to_string(),
        '#' => "hash".to_string(),
        '$' => "dollar".to_string(),
        '%' => "percent".to_string(),
        '^' => "caret".to_string(),
        '&' => "and".to_string(),
        '*' => "star".to_string(),
        '(' => "left paren".to_string(),
        ')' => "right paren".to_string(),
        '!' => "exclamation".to_string(),
        '+' => "plus".to_string(),
        '-' => "dash".to_string(),
        '_' => "underscore".to_string(),
        '=' => "equals".to_string(),
        '`' => "grave".to_string(),
        '~' => "tilde".to_string(),
        '.' => "dot".to_string(),
        '/' => "slash".to_string(),
        _ => ch.to_string(),
    }
}

/// Spoken name for a word-boundary key.
fn boundary_key_name(vk_code: u32) -> &'static str {
    match vk_code {
        vk::RETURN => "Return",
        vk::SPACE => "Space",
        vk::OEM_COMMA => "comma",
        vk::OEM_PERIOD => "dot",
        vk::OEM_1 => "semicolon",
        vk::OEM_2 => "slash",
        _ => "",
    }
}
