//! Say-All: continuous reading from the cursor position.
//!
//! A spawned reader task speaks line after line at Normal priority, yielding
//! between lines so cancellation (any key press, an explicit stop, or a
//! cursor move) takes effect within one scheduling quantum. Starting a new
//! reading cancels the previous one first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::debug;

use crate::speech::{Priority, SpeechHandle};
use crate::vbuffer::Cursor;

pub struct SayAll {
    speech: SpeechHandle,
    cursor: Arc<Mutex<Cursor>>,
    reading: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl SayAll {
    pub fn new(speech: SpeechHandle, cursor: Arc<Mutex<Cursor>>) -> Self {
        Self {
            speech,
            cursor,
            reading: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    /// Starts reading from the current line; cancels any reading already in
    /// progress.
    pub fn start(&mut self) {
        self.cancel();

        self.reading.store(true, Ordering::SeqCst);
        let reading = self.reading.clone();
        let speech = self.speech.clone();
        let cursor = self.cursor.clone();

        self.task = Some(tokio::spawn(async move {
            debug!("Say-all started");
            if let Some(line) = cursor.lock().expect("cursor lock poisoned").current_line() {
                if !line.is_empty() {
                    speech.say(line, Priority::Normal);
                }
            }

            while reading.load(Ordering::SeqCst) {
                let line = cursor.lock().expect("cursor lock poisoned").next_line();
                match line {
                    Some(line) => {
                        if !line.is_empty() {
                            speech.say(line, Priority::Normal);
                        }
                    }
                    None => break,
                }
                // Cancellation checkpoint between lines.
                tokio::task::yield_now().await;
            }
            reading.store(false, Ordering::SeqCst);
            debug!("Say-all finished");
        }));
    }

    /// Stops the reader; safe to call when idle.
    pub fn cancel(&mut self) {
        if self.reading.swap(false, Ordering::SeqCst) {
            debug!("Say-all cancelled");
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_reading(&self) -> bool {
        self.reading.load(Ordering::SeqCst)
    }
}
