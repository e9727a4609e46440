//! Ariavox: screen reader core binary.
//!
//! Wires the pipeline together: settings, speech queue, cue player, event
//! bus, keyboard capture, and (on Windows) the low-level hook. Runs the
//! first-run wizard when the settings record says it has never completed.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ariavox::a11y::AccessibilityHost;
use ariavox::agent::ScreenReaderAgent;
use ariavox::audio::CuePlayer;
use ariavox::events::{EventBus, EventSink};
use ariavox::input::dispatcher::InputDispatcher;
use ariavox::input::echo::TypingEchoHandler;
use ariavox::input::keymap::Keymap;
use ariavox::input::KeyboardCapture;
use ariavox::metrics::PipelineMetrics;
use ariavox::settings::{JsonSettingsStore, Settings, SettingsHandle};
use ariavox::speech::{create_backend, SpeechQueue};
use ariavox::wizard::FirstRunWizard;

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ariavox")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Ariavox starting");

    let settings_path = Settings::default_path();
    let settings = SettingsHandle::new(Settings::load_or_default(&settings_path));
    let keymap = Arc::new(Keymap::load(&config_dir().join("keymap.json")));
    let metrics = PipelineMetrics::new();

    let backend = create_backend().context("Failed to create speech backend")?;
    if let Err(e) = backend.set_rate(settings.snapshot().speech_rate_wpm) {
        warn!("Could not apply speech rate: {e:#}");
    }
    if let Some(voice) = settings.snapshot().voice_name.clone() {
        if let Err(e) = backend.set_voice(&voice) {
            warn!("Could not apply voice {voice:?}: {e:#}");
        }
    }
    let mut queue = SpeechQueue::spawn(backend.clone(), metrics.clone());

    let cues = Arc::new(CuePlayer::new(
        &config_dir().join("sounds"),
        settings.snapshot().audio_cues_enabled,
    ));

    let mut bus = EventBus::new(metrics.clone());
    let sink: Arc<dyn EventSink> = Arc::new(bus.sender());

    let agent = Arc::new(ScreenReaderAgent::new(
        settings.clone(),
        queue.handle(),
        cues.clone(),
        sink.clone(),
    ));
    bus.start(vec![agent.clone()]);

    // All platform accessibility calls marshal through this worker.
    let host = AccessibilityHost::new().context("Failed to start accessibility worker")?;

    #[cfg(target_os = "windows")]
    register_a11y_events(&host, &sink).await;
    #[cfg(not(target_os = "windows"))]
    info!("No platform accessibility source on this OS; events must be injected");

    // Keyboard capture first; the hook writes into it the moment it is
    // installed, and the wizard (when it runs) reads it before the
    // dispatcher takes over.
    let capture = Arc::new(KeyboardCapture::new());

    #[cfg(target_os = "windows")]
    let hook = install_hook(&capture, &settings, &sink);
    #[cfg(not(target_os = "windows"))]
    info!("No platform keyboard hook on this OS; input must be injected");

    if !settings.snapshot().first_run_completed {
        run_first_run_wizard(&capture, &settings, &queue, backend.clone(), &settings_path).await;
        #[cfg(target_os = "windows")]
        if let Some(hook) = hook.as_ref() {
            // The wizard may have changed the reader modifier.
            hook.set_reader_vk(settings.snapshot().modifier_key.vk_code());
        }
    }

    let echo = TypingEchoHandler::new(settings.clone(), sink.clone());
    let mut dispatcher = InputDispatcher::spawn(
        capture.clone(),
        keymap,
        agent.mode_handle(),
        sink.clone(),
        echo,
        metrics.clone(),
    );

    info!("Ariavox ready");
    tokio::signal::ctrl_c().await.context("Signal wait failed")?;
    info!("Ariavox shutting down");

    #[cfg(target_os = "windows")]
    if let Some(hook) = hook {
        hook.uninstall();
    }
    dispatcher.stop_async().await;
    bus.stop_async().await;
    #[cfg(target_os = "windows")]
    if let Err(e) = ariavox::a11y::uia::unregister(&host).await {
        warn!("UI Automation deregistration: {e:#}");
    }
    if let Err(e) = host.shutdown().await {
        warn!("Accessibility worker shutdown: {e:#}");
    }
    queue.dispose().await;

    let snapshot = metrics.snapshot();
    info!(
        "Session: {} keys, {} events, {} utterances ({} coalesced), {} backend errors",
        snapshot.keys_captured,
        snapshot.events_dispatched,
        snapshot.utterances_spoken,
        snapshot.utterances_coalesced,
        snapshot.backend_errors
    );
    Ok(())
}

/// Runs the wizard over keys read straight from the capture layer (the
/// dispatcher is not running yet, so nothing competes for them).
async fn run_first_run_wizard(
    capture: &Arc<KeyboardCapture>,
    settings: &SettingsHandle,
    queue: &SpeechQueue,
    backend: Arc<dyn ariavox::speech::SpeechBackend>,
    settings_path: &std::path::Path,
) {
    let store = Arc::new(JsonSettingsStore::new(settings_path.to_path_buf()));
    let wizard = FirstRunWizard::new(queue.handle(), backend, settings.clone(), store);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let forwarder = {
        let capture = capture.clone();
        tokio::spawn(async move {
            loop {
                while let Some(key) = capture.try_next() {
                    if tx.send(key).is_err() {
                        return;
                    }
                }
                capture.wait().await;
            }
        })
    };

    match wizard.run(&mut rx).await {
        Ok(outcome) => info!("First-run wizard finished: {outcome:?}"),
        Err(e) => warn!("First-run wizard failed: {e:#}"),
    }
    forwarder.abort();
}

/// Subscribes the pipeline to UI Automation focus, structure, property,
/// live-region, and notification events; the handlers translate cached
/// property batches into value events and post them onto the bus.
#[cfg(target_os = "windows")]
async fn register_a11y_events(host: &AccessibilityHost, sink: &Arc<dyn EventSink>) {
    use ariavox::a11y::events::EventTranslator;
    use ariavox::events::{EventKind, ScreenReaderEvent};

    let translator = Arc::new(EventTranslator::new(sink.clone()));
    if let Err(e) = ariavox::a11y::uia::register(host, translator).await {
        // Degraded but alive: reading already-built snapshots and speech
        // still work without platform events.
        tracing::error!("UI Automation registration failed: {e:#}");
        sink.post(ScreenReaderEvent::now(EventKind::Notification {
            text: "Accessibility events are unavailable".to_string(),
        }));
    }
}

#[cfg(target_os = "windows")]
fn install_hook(
    capture: &Arc<KeyboardCapture>,
    settings: &SettingsHandle,
    sink: &Arc<dyn EventSink>,
) -> Option<ariavox::input::hook::KeyboardHook> {
    use ariavox::events::{EventKind, ScreenReaderEvent};
    use ariavox::input::hook::KeyboardHook;

    match KeyboardHook::install(
        capture.injector(),
        settings.snapshot().modifier_key.vk_code(),
    ) {
        Ok(hook) => Some(hook),
        Err(e) => {
            // Stay alive with zero input rather than exit; speech and
            // accessibility events still work.
            tracing::error!("Keyboard hook unavailable: {e:#}");
            sink.post(ScreenReaderEvent::now(EventKind::Notification {
                text: "Keyboard capture is unavailable".to_string(),
            }));
            None
        }
    }
}
