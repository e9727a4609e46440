//! Priority-ordered utterance queue.
//!
//! Producers enqueue without blocking from any thread; a single consumer
//! task drains the channel, orders the batch by priority, coalesces runs of
//! Normal utterances, and drives the backend one speak at a time.
//!
//! Interrupt semantics: an `Interrupt` utterance cancels in-progress speech
//! synchronously at enqueue time (and again at drain time, in case one slid
//! into a batch), so the consumer's in-flight `speak` future unblocks before
//! the interrupt itself is spoken.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{CancelToken, Priority, SpeechBackend, Utterance};
use crate::metrics::PipelineMetrics;

/// How long a lone Normal utterance waits for company before speaking.
pub const COALESCE_WINDOW: Duration = Duration::from_millis(50);

const DISPOSE_TIMEOUT: Duration = Duration::from_secs(2);

enum QueueMessage {
    Speak(Utterance),
    Shutdown,
}

/// Cloneable producer handle. `enqueue` never blocks and never fails.
#[derive(Clone)]
pub struct SpeechHandle {
    tx: UnboundedSender<QueueMessage>,
    backend: Arc<dyn SpeechBackend>,
    current_cancel: Arc<Mutex<Arc<CancelToken>>>,
}

impl SpeechHandle {
    pub fn enqueue(&self, utterance: Utterance) {
        if utterance.priority == Priority::Interrupt {
            self.cancel_current();
        }
        // A closed channel means the queue is disposing; drop silently.
        let _ = self.tx.send(QueueMessage::Speak(utterance));
    }

    pub fn say(&self, text: impl Into<String>, priority: Priority) {
        self.enqueue(Utterance::new(text, priority));
    }

    /// Stops whatever is being spoken right now.
    pub fn cancel_current(&self) {
        self.backend.cancel();
        self.current_cancel
            .lock()
            .expect("cancel lock poisoned")
            .cancel();
    }
}

/// The queue: owns the consumer task and the backend.
pub struct SpeechQueue {
    handle: SpeechHandle,
    consumer: Option<JoinHandle<()>>,
}

impl SpeechQueue {
    /// Spawns the consumer task over `backend`.
    pub fn spawn(backend: Arc<dyn SpeechBackend>, metrics: PipelineMetrics) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let current_cancel: Arc<Mutex<Arc<CancelToken>>> =
            Arc::new(Mutex::new(Arc::new(CancelToken::new())));

        let task_backend = backend.clone();
        let task_cancel = current_cancel.clone();
        let consumer = tokio::spawn(async move {
            debug!("Speech queue consumer started");
            'outer: loop {
                let Some(first) = rx.recv().await else { break };
                let mut batch = Vec::new();
                let mut shutdown = false;
                match first {
                    QueueMessage::Speak(u) => batch.push(u),
                    QueueMessage::Shutdown => break,
                }
                while let Ok(message) = rx.try_recv() {
                    match message {
                        QueueMessage::Speak(u) => batch.push(u),
                        QueueMessage::Shutdown => {
                            shutdown = true;
                            break;
                        }
                    }
                }

                batch.sort_by_key(|u| u.priority);

                // A lone Normal utterance holds the door open briefly.
                if !shutdown && batch.len() == 1 && batch[0].priority == Priority::Normal {
                    if let Ok(Some(message)) =
                        tokio::time::timeout(COALESCE_WINDOW, rx.recv()).await
                    {
                        match message {
                            QueueMessage::Speak(u) => batch.push(u),
                            QueueMessage::Shutdown => shutdown = true,
                        }
                        while let Ok(message) = rx.try_recv() {
                            match message {
                                QueueMessage::Speak(u) => batch.push(u),
                                QueueMessage::Shutdown => {
                                    shutdown = true;
                                    break;
                                }
                            }
                        }
                        batch.sort_by_key(|u| u.priority);
                    }
                }

                if batch.iter().any(|u| u.priority == Priority::Interrupt) {
                    task_backend.cancel();
                }

                for utterance in coalesce_normals(batch, &metrics) {
                    let token = Arc::new(CancelToken::new());
                    *task_cancel.lock().expect("cancel lock poisoned") = token.clone();

                    match task_backend.speak(&utterance, &token).await {
                        Ok(()) => metrics.record_utterance_spoken(),
                        Err(e) if token.is_cancelled() => {
                            debug!("Speak cancelled: {e:#}");
                        }
                        Err(e) => {
                            warn!("Backend speak failed: {e:#}");
                            metrics.record_backend_error();
                        }
                    }
                }

                if shutdown {
                    break 'outer;
                }
            }
            debug!("Speech queue consumer stopped");
        });

        Self {
            handle: SpeechHandle {
                tx,
                backend,
                current_cancel,
            },
            consumer: Some(consumer),
        }
    }

    /// Returns a producer handle for this queue.
    pub fn handle(&self) -> SpeechHandle {
        self.handle.clone()
    }

    /// Drains and stops the consumer, waiting up to two seconds.
    pub async fn dispose(&mut self) {
        self.handle.cancel_current();
        let _ = self.handle.tx.send(QueueMessage::Shutdown);
        if let Some(handle) = self.consumer.take() {
            if tokio::time::timeout(DISPOSE_TIMEOUT, handle).await.is_err() {
                warn!("Speech queue did not stop within {:?}", DISPOSE_TIMEOUT);
            }
        }
    }
}

/// Merges every maximal run of consecutive Normal utterances into one
/// utterance joined with ". "; other priorities pass through untouched.
fn coalesce_normals(batch: Vec<Utterance>, metrics: &PipelineMetrics) -> Vec<Utterance> {
    let mut out: Vec<Utterance> = Vec::with_capacity(batch.len());
    let mut run: Vec<String> = Vec::new();

    let flush = |run: &mut Vec<String>, out: &mut Vec<Utterance>| {
        if run.is_empty() {
            return;
        }
        if run.len() > 1 {
            metrics.record_utterances_coalesced(run.len() as u64);
        }
        out.push(Utterance::new(run.join(". "), Priority::Normal));
        run.clear();
    };

    for utterance in batch {
        if utterance.priority == Priority::Normal {
            run.push(utterance.text);
        } else {
            flush(&mut run, &mut out);
            out.push(utterance);
        }
    }
    flush(&mut run, &mut out);
    out
}
