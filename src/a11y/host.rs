//! Single-threaded accessibility host.
//!
//! Platform accessibility objects are apartment-threaded: every call must
//! originate from the one worker thread that created them. The host owns
//! that thread and marshals closures onto it; results (or panics, surfaced
//! as errors) come back through a oneshot. Work executes strictly in
//! submission order.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use tokio::sync::oneshot;
use tracing::{debug, warn};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

enum HostMessage {
    Run(Box<dyn FnOnce() + Send>),
    Shutdown,
}

pub struct AccessibilityHost {
    tx: Sender<HostMessage>,
    worker: Option<JoinHandle<()>>,
}

impl AccessibilityHost {
    /// Spawns the worker thread. On Windows the worker enters a
    /// single-threaded COM apartment before processing work.
    pub fn new() -> Result<Self> {
        let (tx, rx) = mpsc::channel::<HostMessage>();

        let worker = std::thread::Builder::new()
            .name("ariavox-a11y".to_string())
            .spawn(move || {
                #[cfg(target_os = "windows")]
                let _apartment = apartment::enter();

                debug!("Accessibility worker started");
                while let Ok(message) = rx.recv() {
                    match message {
                        HostMessage::Run(work) => work(),
                        HostMessage::Shutdown => {
                            // Drain outstanding work before exiting.
                            while let Ok(HostMessage::Run(work)) = rx.try_recv() {
                                work();
                            }
                            break;
                        }
                    }
                }
                debug!("Accessibility worker stopped");
            })
            .context("Failed to spawn accessibility worker")?;

        Ok(Self {
            tx,
            worker: Some(worker),
        })
    }

    /// Submits `work` to the worker thread; the returned future resolves
    /// with its result. Submission happens immediately, so back-to-back
    /// calls execute in call order even if awaited later.
    ///
    /// A panic inside `work` is caught on the worker (keeping it alive) and
    /// surfaces here as an error.
    pub fn run<F, R>(&self, work: F) -> impl std::future::Future<Output = Result<R>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job = Box::new(move || {
            let outcome = catch_unwind(AssertUnwindSafe(work))
                .map_err(|_| anyhow!("accessibility work panicked"));
            let _ = reply_tx.send(outcome);
        });
        let submitted = self
            .tx
            .send(HostMessage::Run(job))
            .map_err(|_| anyhow!("accessibility worker is gone"));
        async move {
            submitted?;
            reply_rx
                .await
                .context("accessibility worker dropped the reply")?
        }
    }

    /// Stops the worker, draining queued work, within five seconds.
    pub async fn shutdown(mut self) -> Result<()> {
        let _ = self.tx.send(HostMessage::Shutdown);
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        let deadline = Instant::now() + SHUTDOWN_TIMEOUT;
        let joined = tokio::task::spawn_blocking(move || {
            // join has no timeout; poll the thread's liveness instead.
            while !worker.is_finished() {
                if Instant::now() >= deadline {
                    return false;
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            worker.join().is_ok()
        })
        .await
        .context("join task failed")?;

        if !joined {
            warn!("Accessibility worker did not stop within {:?}", SHUTDOWN_TIMEOUT);
        }
        Ok(())
    }
}

impl Drop for AccessibilityHost {
    fn drop(&mut self) {
        let _ = self.tx.send(HostMessage::Shutdown);
    }
}

#[cfg(target_os = "windows")]
mod apartment {
    use windows::Win32::System::Com::{CoInitializeEx, CoUninitialize, COINIT_APARTMENTTHREADED};

    pub struct Apartment;

    pub fn enter() -> Apartment {
        unsafe {
            let _ = CoInitializeEx(None, COINIT_APARTMENTTHREADED);
        }
        Apartment
    }

    impl Drop for Apartment {
        fn drop(&mut self) {
            unsafe { CoUninitialize() }
        }
    }
}
