/*!
 * Keyboard Input Module
 *
 * Fixed-size key events, the bounded drop-oldest queue the OS hook writes
 * into, and the platform-neutral capture surface. The Windows low-level
 * hook lives in [`hook`]; everything else here runs on any platform.
 */

pub mod dispatcher;
pub mod echo;
pub mod keymap;

#[cfg(target_os = "windows")]
pub mod hook;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use bitflags::bitflags;
use tokio::sync::Notify;

/// Virtual-key codes the core cares about.
pub mod vk {
    pub const BACK: u32 = 0x08;
    pub const TAB: u32 = 0x09;
    pub const RETURN: u32 = 0x0D;
    pub const SHIFT: u32 = 0x10;
    pub const CONTROL: u32 = 0x11;
    pub const MENU: u32 = 0x12;
    pub const CAPITAL: u32 = 0x14;
    pub const ESCAPE: u32 = 0x1B;
    pub const SPACE: u32 = 0x20;
    pub const END: u32 = 0x23;
    pub const HOME: u32 = 0x24;
    pub const LEFT: u32 = 0x25;
    pub const UP: u32 = 0x26;
    pub const RIGHT: u32 = 0x27;
    pub const DOWN: u32 = 0x28;
    pub const INSERT: u32 = 0x2D;
    pub const DELETE: u32 = 0x2E;
    pub const KEY_0: u32 = 0x30;
    pub const KEY_1: u32 = 0x31;
    pub const KEY_2: u32 = 0x32;
    pub const KEY_3: u32 = 0x33;
    pub const KEY_4: u32 = 0x34;
    pub const KEY_5: u32 = 0x35;
    pub const KEY_6: u32 = 0x36;
    pub const KEY_9: u32 = 0x39;
    pub const KEY_A: u32 = 0x41;
    pub const KEY_D: u32 = 0x44;
    pub const KEY_F: u32 = 0x46;
    pub const KEY_H: u32 = 0x48;
    pub const KEY_K: u32 = 0x4B;
    pub const KEY_T: u32 = 0x54;
    pub const KEY_Z: u32 = 0x5A;
    pub const NUMPAD_0: u32 = 0x60;
    pub const NUMPAD_9: u32 = 0x69;
    pub const MULTIPLY: u32 = 0x6A;
    pub const ADD: u32 = 0x6B;
    pub const SUBTRACT: u32 = 0x6D;
    pub const DECIMAL: u32 = 0x6E;
    pub const DIVIDE: u32 = 0x6F;
    pub const F7: u32 = 0x76;
    // The low-level hook reports left/right variants, never the generic
    // modifier codes.
    pub const LCONTROL: u32 = 0xA2;
    pub const RCONTROL: u32 = 0xA3;
    pub const OEM_1: u32 = 0xBA; // ;:
    pub const OEM_PLUS: u32 = 0xBB;
    pub const OEM_COMMA: u32 = 0xBC;
    pub const OEM_MINUS: u32 = 0xBD;
    pub const OEM_PERIOD: u32 = 0xBE;
    pub const OEM_2: u32 = 0xBF; // /?
    pub const OEM_3: u32 = 0xC0; // `~
}

bitflags! {
    /// Modifier state sampled at hook time. `READER` is the configurable
    /// screen-reader modifier (Insert or CapsLock).
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Modifiers: u8 {
        const SHIFT = 1 << 0;
        const CTRL = 1 << 1;
        const ALT = 1 << 2;
        const READER = 1 << 3;
    }
}

/// One keyboard transition. Fixed-size, trivially copyable; produced on the
/// hook hot path, so it must never allocate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeyEvent {
    pub vk: u32,
    pub modifiers: Modifiers,
    pub pressed: bool,
    /// OS tick-count timestamp in milliseconds.
    pub time_ms: u32,
}

impl KeyEvent {
    pub fn down(vk: u32, modifiers: Modifiers) -> Self {
        Self {
            vk,
            modifiers,
            pressed: true,
            time_ms: 0,
        }
    }

    pub fn up(vk: u32, modifiers: Modifiers) -> Self {
        Self {
            vk,
            modifiers,
            pressed: false,
            time_ms: 0,
        }
    }
}

/// Queue capacity. One slot is reserved to tell full from empty.
pub const KEY_QUEUE_CAPACITY: usize = 256;

/// Bounded single-producer single-consumer queue with drop-oldest overflow.
///
/// The producer is the OS hook callback: `push` never blocks and never
/// allocates. When the queue is full the oldest unread event is discarded,
/// because a responsive reader beats a complete echo history.
pub struct KeyQueue {
    buffer: Vec<KeyEvent>,
    capacity: usize,
    write_pos: AtomicUsize,
    read_pos: AtomicUsize,
    dropped: AtomicU64,
}

impl KeyQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![KeyEvent::default(); capacity],
            capacity,
            write_pos: AtomicUsize::new(0),
            read_pos: AtomicUsize::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Writes one event, discarding the oldest unread event when full.
    /// Returns false when something was discarded to make room.
    pub fn push(&self, event: KeyEvent) -> bool {
        let mut displaced = false;
        loop {
            let write = self.write_pos.load(Ordering::Acquire);
            let read = self.read_pos.load(Ordering::Acquire);

            if self.available_write(write, read) == 0 {
                let next = (read + 1) % self.capacity;
                if self
                    .read_pos
                    .compare_exchange(read, next, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    displaced = true;
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
                continue;
            }

            unsafe {
                let slot = self.buffer.as_ptr().add(write) as *mut KeyEvent;
                std::ptr::write(slot, event);
            }
            self.write_pos
                .store((write + 1) % self.capacity, Ordering::Release);
            return !displaced;
        }
    }

    /// Reads one event, if any.
    pub fn pop(&self) -> Option<KeyEvent> {
        loop {
            let write = self.write_pos.load(Ordering::Acquire);
            let read = self.read_pos.load(Ordering::Acquire);
            if write == read {
                return None;
            }
            let event = unsafe { std::ptr::read(self.buffer.as_ptr().add(read)) };
            let next = (read + 1) % self.capacity;
            // The producer may have displaced this slot concurrently; only
            // hand the event out if we still own the read position.
            if self
                .read_pos
                .compare_exchange(read, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(event);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.write_pos.load(Ordering::Acquire) == self.read_pos.load(Ordering::Acquire)
    }

    /// Total events discarded by drop-oldest since construction.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn available_write(&self, write: usize, read: usize) -> usize {
        let used = if write >= read {
            write - read
        } else {
            self.capacity - read + write
        };
        self.capacity - used - 1
    }
}

unsafe impl Send for KeyQueue {}
unsafe impl Sync for KeyQueue {}

/// Platform-neutral capture surface: the queue plus a wakeup for the
/// consumer task. The Windows hook and tests both write through an
/// [`KeyInjector`].
pub struct KeyboardCapture {
    queue: Arc<KeyQueue>,
    notify: Arc<Notify>,
}

impl KeyboardCapture {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(KeyQueue::new(KEY_QUEUE_CAPACITY)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Returns a producer handle.
    pub fn injector(&self) -> KeyInjector {
        KeyInjector {
            queue: self.queue.clone(),
            notify: self.notify.clone(),
        }
    }

    /// Reads one queued event without waiting.
    pub fn try_next(&self) -> Option<KeyEvent> {
        self.queue.pop()
    }

    /// Waits until at least one event is likely available.
    pub async fn wait(&self) {
        self.notify.notified().await;
    }

    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }
}

impl Default for KeyboardCapture {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable producer half of [`KeyboardCapture`].
#[derive(Clone)]
pub struct KeyInjector {
    queue: Arc<KeyQueue>,
    notify: Arc<Notify>,
}

impl KeyInjector {
    /// Hot-path write: queue push plus a wakeup, nothing else.
    pub fn inject(&self, event: KeyEvent) {
        self.queue.push(event);
        self.notify.notify_one();
    }
}
