//! Typed event bus: multi-producer, single consumer task.
//!
//! Producers post from any thread through a cloneable [`EventSender`]. One
//! spawned consumer task reads events in order, collapses focus bursts, and
//! fans out to subscribers. A subscriber error is logged and dispatch
//! continues; nothing a subscriber does can stop the loop.
//!
//! Focus coalescing: when a `FocusChanged` arrives, the consumer waits 30 ms
//! and drains whatever queued up in that window. Only the last focus event of
//! the window survives; non-focus events drained alongside it are dispatched
//! first, in arrival order.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{EventKind, EventSink, ScreenReaderEvent};
use crate::metrics::PipelineMetrics;

/// How long a focus event waits for successors before dispatch.
pub const FOCUS_COALESCE_WINDOW: Duration = Duration::from_millis(30);

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Receives bus notifications. All methods run on the consumer task.
///
/// The three named notifications mirror the pipeline's main spines; every
/// other event variant arrives through [`BusSubscriber::on_event`].
pub trait BusSubscriber: Send + Sync {
    fn on_focus_changed(&self, element: &super::ElementSnapshot) -> anyhow::Result<()> {
        let _ = element;
        Ok(())
    }

    fn on_navigation_command(
        &self,
        command: crate::input::keymap::NavigationCommand,
    ) -> anyhow::Result<()> {
        let _ = command;
        Ok(())
    }

    fn on_raw_key(&self, key: crate::input::KeyEvent) -> anyhow::Result<()> {
        let _ = key;
        Ok(())
    }

    /// Catch-all for the remaining event variants (live regions, typing
    /// echo, mode changes, structure and property changes, notifications).
    fn on_event(&self, event: &ScreenReaderEvent) -> anyhow::Result<()> {
        let _ = event;
        Ok(())
    }
}

enum BusMessage {
    Event(ScreenReaderEvent),
    Shutdown,
}

/// Cloneable, non-blocking producer handle.
#[derive(Clone)]
pub struct EventSender {
    tx: UnboundedSender<BusMessage>,
}

impl EventSink for EventSender {
    fn post(&self, event: ScreenReaderEvent) {
        // A closed bus means shutdown is in progress; drop silently.
        let _ = self.tx.send(BusMessage::Event(event));
    }
}

/// The bus itself: owns the channel and, once started, the consumer task.
///
/// Construction is split from starting the consumer so producers can be
/// handed senders while the subscriber set is still being wired up.
pub struct EventBus {
    tx: UnboundedSender<BusMessage>,
    rx: Option<mpsc::UnboundedReceiver<BusMessage>>,
    metrics: PipelineMetrics,
    consumer: Option<JoinHandle<()>>,
}

impl EventBus {
    pub fn new(metrics: PipelineMetrics) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Some(rx),
            metrics,
            consumer: None,
        }
    }

    /// Convenience constructor: build and immediately start.
    pub fn spawn(subscribers: Vec<Arc<dyn BusSubscriber>>, metrics: PipelineMetrics) -> Self {
        let mut bus = Self::new(metrics);
        bus.start(subscribers);
        bus
    }

    /// Starts the consumer task over a fixed subscriber set.
    pub fn start(&mut self, subscribers: Vec<Arc<dyn BusSubscriber>>) {
        let Some(mut rx) = self.rx.take() else {
            warn!("Event bus consumer already started");
            return;
        };
        let metrics = self.metrics.clone();

        let consumer = tokio::spawn(async move {
            debug!("Event bus consumer started");
            'outer: while let Some(message) = rx.recv().await {
                let event = match message {
                    BusMessage::Event(event) => event,
                    BusMessage::Shutdown => break,
                };

                if !event.is_focus_changed() {
                    dispatch(&subscribers, &metrics, &event);
                    continue;
                }

                // Focus burst: wait out the window, then keep only the last.
                tokio::time::sleep(FOCUS_COALESCE_WINDOW).await;

                let mut kept_focus = event;
                let mut shutdown = false;
                while let Ok(message) = rx.try_recv() {
                    match message {
                        BusMessage::Event(drained) if drained.is_focus_changed() => {
                            kept_focus = drained;
                        }
                        BusMessage::Event(drained) => {
                            dispatch(&subscribers, &metrics, &drained);
                        }
                        BusMessage::Shutdown => {
                            shutdown = true;
                            break;
                        }
                    }
                }
                dispatch(&subscribers, &metrics, &kept_focus);
                if shutdown {
                    break 'outer;
                }
            }
            debug!("Event bus consumer stopped");
        });

        self.consumer = Some(consumer);
    }

    /// Returns a producer handle for this bus.
    pub fn sender(&self) -> EventSender {
        EventSender {
            tx: self.tx.clone(),
        }
    }

    /// Stops the consumer, waiting up to two seconds for it to drain.
    pub async fn stop_async(&mut self) {
        let _ = self.tx.send(BusMessage::Shutdown);
        if let Some(handle) = self.consumer.take() {
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await.is_err() {
                warn!("Event bus consumer did not stop within {:?}", SHUTDOWN_TIMEOUT);
            }
        }
    }
}

fn dispatch(
    subscribers: &[Arc<dyn BusSubscriber>],
    metrics: &PipelineMetrics,
    event: &ScreenReaderEvent,
) {
    metrics.record_event_dispatched();
    for subscriber in subscribers {
        let result = match &event.kind {
            EventKind::FocusChanged(element) => subscriber.on_focus_changed(element),
            EventKind::NavigationCommand(command) => subscriber.on_navigation_command(*command),
            EventKind::RawKey(key) => subscriber.on_raw_key(*key),
            _ => subscriber.on_event(event),
        };
        if let Err(e) = result {
            warn!("Bus subscriber failed: {e:#}");
        }
    }
}
