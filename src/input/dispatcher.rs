//! Input consumer task: turns queued key events into bus traffic.
//!
//! Owns command resolution and typing echo. Key-downs that resolve against
//! the keymap are consumed as `NavigationCommand`s; everything else flows on
//! as `RawKey` (key-ups always do, because typing echo fires on key-up).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::debug;

use super::echo::TypingEchoHandler;
use super::keymap::Keymap;
use super::KeyboardCapture;
use crate::events::{EventKind, EventSink, ScreenReaderEvent};
use crate::metrics::PipelineMetrics;
use crate::mode::ModeHandle;

pub struct InputDispatcher {
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    handle: Option<JoinHandle<()>>,
}

impl InputDispatcher {
    /// Spawns the consumer over `capture`.
    pub fn spawn(
        capture: Arc<KeyboardCapture>,
        keymap: Arc<Keymap>,
        mode: ModeHandle,
        sink: Arc<dyn EventSink>,
        mut echo: TypingEchoHandler,
        metrics: PipelineMetrics,
    ) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let shutdown = Arc::new(Notify::new());

        let task_running = running.clone();
        let task_shutdown = shutdown.clone();
        let handle = tokio::spawn(async move {
            debug!("Input dispatcher started");
            let mut seen_dropped = 0u64;
            while task_running.load(Ordering::Relaxed) {
                while let Some(event) = capture.try_next() {
                    metrics.record_key_captured();

                    let resolved = if event.pressed {
                        keymap.try_resolve(event.modifiers, event.vk, mode.current())
                    } else {
                        None
                    };

                    match resolved {
                        Some(command) => {
                            sink.post(ScreenReaderEvent::now(EventKind::NavigationCommand(
                                command,
                            )));
                        }
                        None => {
                            sink.post(ScreenReaderEvent::now(EventKind::RawKey(event)));
                            echo.handle_key(event);
                        }
                    }
                }

                let dropped = capture.dropped();
                for _ in seen_dropped..dropped {
                    metrics.record_key_dropped();
                }
                seen_dropped = dropped;

                tokio::select! {
                    _ = capture.wait() => {}
                    _ = task_shutdown.notified() => break,
                }
            }
            debug!("Input dispatcher stopped");
        });

        Self {
            running,
            shutdown,
            handle: Some(handle),
        }
    }

    pub async fn stop_async(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        self.shutdown.notify_waiters();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}
