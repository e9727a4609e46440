//! Screen-reader event model.
//!
//! Everything that flows through the pipeline is a value: events carry all
//! information needed to dispatch without ever touching a live accessibility
//! object. Every event is stamped with a monotonic timestamp at creation.

pub mod bus;

use std::time::Instant;

use crate::input::keymap::NavigationCommand;
use crate::input::KeyEvent;

pub use bus::{BusSubscriber, EventBus, EventSender};

/// Process-wide interaction mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Single-letter keys are consumed for quick navigation.
    #[default]
    Browse,
    /// Keys pass through to the focused application.
    Focus,
}

/// Live-region politeness, mirroring `aria-live`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Politeness {
    Polite,
    Assertive,
}

/// Which property a `PropertyChanged` event refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropertyKind {
    Name,
    ExpandCollapseState,
}

/// Value-typed snapshot of an accessible element, captured at callback time.
///
/// Built from the platform's cached property batch; safe to pass between
/// threads and to inspect long after the live element has gone away.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ElementSnapshot {
    pub runtime_id: Vec<i32>,
    pub name: String,
    pub control_type: String,
    pub heading_level: u8,
    pub landmark: String,
    pub is_link: bool,
    pub is_focusable: bool,
}

/// The tagged union of everything the pipeline reacts to.
#[derive(Clone, Debug)]
pub enum EventKind {
    FocusChanged(ElementSnapshot),
    NavigationCommand(NavigationCommand),
    RawKey(KeyEvent),
    LiveRegionChanged {
        source_id: String,
        text: String,
        politeness: Politeness,
    },
    ModeChanged {
        mode: Mode,
        reason: String,
    },
    TypingEcho {
        text: String,
        is_word: bool,
    },
    StructureChanged {
        runtime_id: Vec<i32>,
    },
    PropertyChanged {
        runtime_id: Vec<i32>,
        property: PropertyKind,
        value: String,
    },
    Notification {
        text: String,
    },
}

/// A pipeline event plus the instant it was produced.
#[derive(Clone, Debug)]
pub struct ScreenReaderEvent {
    pub timestamp: Instant,
    pub kind: EventKind,
}

impl ScreenReaderEvent {
    /// Stamps `kind` with the current monotonic time.
    pub fn now(kind: EventKind) -> Self {
        Self {
            timestamp: Instant::now(),
            kind,
        }
    }

    /// True for `FocusChanged`; the bus coalesces these.
    pub fn is_focus_changed(&self) -> bool {
        matches!(self.kind, EventKind::FocusChanged(_))
    }
}

/// Non-blocking event producer seam.
///
/// Implementors must return promptly: callers include platform callback
/// threads and the input consumer, neither of which may stall.
pub trait EventSink: Send + Sync {
    fn post(&self, event: ScreenReaderEvent);
}
