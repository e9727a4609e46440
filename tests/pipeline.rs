//! End-to-end pipeline scenarios: bus, agent, speech queue, and virtual
//! buffer working together the way the running binary wires them.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use ariavox::a11y::StaticElement;
use ariavox::agent::ScreenReaderAgent;
use ariavox::audio::{Cue, RecordingCueSink};
use ariavox::events::{
    BusSubscriber, ElementSnapshot, EventBus, EventKind, EventSink, Mode, Politeness,
    ScreenReaderEvent,
};
use ariavox::input::keymap::NavigationCommand;
use ariavox::input::{vk, KeyEvent, Modifiers};
use ariavox::metrics::PipelineMetrics;
use ariavox::speech::{CancelToken, Priority, SpeechBackend, SpeechQueue, Utterance};
use ariavox::vbuffer::build_document;

#[derive(Default)]
struct MockBackend {
    spoken: Mutex<Vec<(String, Priority)>>,
    cancels: Mutex<u32>,
}

#[async_trait]
impl SpeechBackend for MockBackend {
    async fn speak(&self, utterance: &Utterance, _cancel: &CancelToken) -> Result<()> {
        self.spoken
            .lock()
            .unwrap()
            .push((utterance.text.clone(), utterance.priority));
        Ok(())
    }

    fn cancel(&self) {
        *self.cancels.lock().unwrap() += 1;
    }

    fn set_rate(&self, _wpm: u32) -> Result<()> {
        Ok(())
    }

    fn set_voice(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    fn available_voices(&self) -> Vec<String> {
        vec!["Test Voice".to_string()]
    }

    fn is_speaking(&self) -> bool {
        false
    }
}

impl MockBackend {
    fn texts(&self) -> Vec<String> {
        self.spoken.lock().unwrap().iter().map(|(t, _)| t.clone()).collect()
    }
}

#[derive(Default)]
struct EventRecorder {
    modes: Mutex<Vec<Mode>>,
}

impl BusSubscriber for EventRecorder {
    fn on_event(&self, event: &ScreenReaderEvent) -> Result<()> {
        if let EventKind::ModeChanged { mode, .. } = &event.kind {
            self.modes.lock().unwrap().push(*mode);
        }
        Ok(())
    }
}

struct Pipeline {
    agent: Arc<ScreenReaderAgent>,
    backend: Arc<MockBackend>,
    cues: Arc<RecordingCueSink>,
    recorder: Arc<EventRecorder>,
    bus: EventBus,
    queue: SpeechQueue,
    sink: Arc<dyn EventSink>,
}

fn pipeline() -> Pipeline {
    let metrics = PipelineMetrics::new();
    let backend = Arc::new(MockBackend::default());
    let queue = SpeechQueue::spawn(backend.clone(), metrics.clone());
    let cues = Arc::new(RecordingCueSink::new());

    let mut bus = EventBus::new(metrics);
    let sink: Arc<dyn EventSink> = Arc::new(bus.sender());

    let agent = Arc::new(ScreenReaderAgent::new(
        ariavox::settings::SettingsHandle::new(Default::default()),
        queue.handle(),
        cues.clone(),
        sink.clone(),
    ));
    let recorder = Arc::new(EventRecorder::default());
    bus.start(vec![agent.clone(), recorder.clone()]);

    Pipeline {
        agent,
        backend,
        cues,
        recorder,
        bus,
        queue,
        sink,
    }
}

async fn shutdown(mut p: Pipeline) {
    p.bus.stop_async().await;
    p.queue.dispose().await;
}

fn heading(id: i32, level: u8, name: &str) -> StaticElement {
    StaticElement::new(vec![id], "Text", name)
        .with_role("heading")
        .with_properties(&format!("level={level}"))
}

/// Scenario: heading navigation over a three-heading page, with and
/// without wrap.
#[test]
fn heading_nav_walks_and_wraps() {
    let cues = Arc::new(RecordingCueSink::new());
    let doc = Arc::new(build_document(
        &StaticElement::new(vec![0], "Document", "")
            .with_child(heading(1, 1, "Intro"))
            .with_child(heading(2, 2, "Details"))
            .with_child(heading(3, 1, "Summary")),
    ));

    let mut cursor = ariavox::vbuffer::Cursor::new(doc.clone(), cues.clone());
    let mut nav = ariavox::nav::QuickNav::new(cues.clone());

    let mut names = Vec::new();
    for _ in 0..3 {
        let id = nav.navigate(&mut cursor, NavigationCommand::NextHeading).unwrap();
        names.push(doc.nodes[id].name.clone());
    }
    assert_eq!(names, vec!["Intro", "Details", "Summary"]);

    nav.set_wrap(true);
    let id = nav.navigate(&mut cursor, NavigationCommand::NextHeading).unwrap();
    assert_eq!(doc.nodes[id].name, "Intro");
    assert_eq!(cues.played(), vec![Cue::Wrap]);
}

/// Scenario: activating an edit field flips to focus mode; focusing a
/// heading afterwards flips back, each with cue, interrupt speech, and a
/// ModeChanged event.
#[tokio::test]
async fn mode_auto_switches_around_forms() {
    let p = pipeline();
    let doc = Arc::new(build_document(
        &StaticElement::new(vec![0], "Document", "")
            .with_child(StaticElement::new(vec![1], "Edit", "Name").focusable())
            .with_child(heading(2, 1, "Results")),
    ));
    p.agent.set_document(doc);

    // Land on the edit field, then activate it.
    p.sink.post(ScreenReaderEvent::now(EventKind::NavigationCommand(
        NavigationCommand::NextFormField,
    )));
    p.sink.post(ScreenReaderEvent::now(EventKind::NavigationCommand(
        NavigationCommand::ActivateElement,
    )));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(*p.recorder.modes.lock().unwrap(), vec![Mode::Focus]);
    assert!(p.cues.played().contains(&Cue::FocusMode));
    let spoken = p.backend.spoken.lock().unwrap().clone();
    assert!(spoken.contains(&("Focus mode".to_string(), Priority::Interrupt)));
    drop(spoken);

    // Focus moves to a heading: back to browse.
    p.sink.post(ScreenReaderEvent::now(EventKind::FocusChanged(
        ElementSnapshot {
            runtime_id: vec![2],
            name: "Results".to_string(),
            control_type: "Heading".to_string(),
            heading_level: 1,
            ..Default::default()
        },
    )));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(
        *p.recorder.modes.lock().unwrap(),
        vec![Mode::Focus, Mode::Browse]
    );
    assert!(p.cues.played().contains(&Cue::BrowseMode));
    let spoken = p.backend.spoken.lock().unwrap().clone();
    assert!(spoken.contains(&("Browse mode".to_string(), Priority::Interrupt)));
    drop(spoken);

    shutdown(p).await;
}

/// Scenario: live-region diff plus polite throttling over a timeline. The
/// "Done" swallowed inside the cooldown is not recorded as the diff
/// baseline, so the same "Done" announces once the cooldown elapses.
#[test]
fn live_region_diff_and_throttle_timeline() {
    use ariavox::a11y::live_region::Clock;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Instant;

    struct ManualClock {
        origin: Instant,
        offset_ms: AtomicU64,
    }
    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.origin + Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
        }
    }

    let clock = Arc::new(ManualClock {
        origin: Instant::now(),
        offset_ms: AtomicU64::new(0),
    });
    let monitor = ariavox::a11y::LiveRegionMonitor::with_clock(clock.clone());

    assert!(monitor.should_announce(Some("42,7"), "Loading…", Politeness::Polite));

    clock.offset_ms.store(100, Ordering::SeqCst);
    assert!(!monitor.should_announce(Some("42,7"), "Loading…", Politeness::Polite));

    clock.offset_ms.store(300, Ordering::SeqCst);
    assert!(!monitor.should_announce(Some("42,7"), "Done", Politeness::Polite));

    clock.offset_ms.store(600, Ordering::SeqCst);
    assert!(monitor.should_announce(Some("42,7"), "Done", Politeness::Polite));
}

/// Scenario: verbosity profiles shape the announcement text.
#[test]
fn announcement_verbosity_matrix() {
    use ariavox::nav::{build_announcement, VerbosityProfile};

    let doc = build_document(
        &StaticElement::new(vec![0], "Document", "")
            .with_child(
                StaticElement::new(vec![1], "Text", "Home")
                    .with_role("link")
                    .with_properties("visited=true"),
            )
            .with_child(heading(2, 2, "Products")),
    );
    let home = doc.find_by_runtime_id(&[1]).unwrap().id;
    let products = doc.find_by_runtime_id(&[2]).unwrap().id;

    assert_eq!(
        build_announcement(&doc, home, &VerbosityProfile::beginner()),
        "Home, hyperlink, visited"
    );
    assert_eq!(
        build_announcement(&doc, home, &VerbosityProfile::intermediate()),
        "Home, hyperlink, visited"
    );
    assert_eq!(
        build_announcement(&doc, home, &VerbosityProfile::advanced()),
        "Home"
    );
    assert_eq!(
        build_announcement(&doc, products, &VerbosityProfile::beginner()),
        "heading level 2, Products"
    );
    assert_eq!(
        build_announcement(&doc, products, &VerbosityProfile::advanced()),
        "Products"
    );
}

/// Scenario: incremental splice shifts following nodes by the text length
/// difference and keeps runtime ids stable.
#[test]
fn incremental_splice_shifts_offsets() {
    let doc = Arc::new(build_document(
        &StaticElement::new(vec![0], "Document", "")
            .with_child(heading(1, 1, "Welcome"))
            .with_child(StaticElement::new(vec![2], "Hyperlink", "Click here")),
    ));
    let link_start_before = doc.find_by_runtime_id(&[2]).unwrap().range.0;

    let replacement = heading(1, 1, "Hi");
    let updated = ariavox::vbuffer::apply_update(&doc, &[1], Some(&replacement));

    let link = updated.find_by_runtime_id(&[2]).unwrap();
    // "Welcome\n" (8) became "Hi\n" (3): the link moved left by 5.
    assert_eq!(link.range.0, link_start_before - 5);
    assert_eq!(link.runtime_id, vec![2]);
    assert!(!updated.flat_text.contains("Welcome"));
    assert!(updated.flat_text.contains("Hi"));
}

/// Scenario: say-all stops within one scheduling quantum of a key press.
#[tokio::test]
async fn say_all_cancels_on_key_event() {
    let p = pipeline();
    let mut root = StaticElement::new(vec![0], "Document", "");
    for i in 0..10 {
        root = root.with_child(StaticElement::new(
            vec![1, i],
            "Text",
            &format!("Line number {i}"),
        ));
    }
    p.agent.set_document(Arc::new(build_document(&root)));

    p.agent
        .on_navigation_command(NavigationCommand::SayAll)
        .unwrap();
    tokio::task::yield_now().await;

    // Any key press cancels the reader.
    p.agent
        .on_raw_key(KeyEvent::down(vk::KEY_A, Modifiers::empty()))
        .unwrap();
    assert!(!p.agent.is_reading());

    let enqueued_at_cancel = p.backend.texts().len();
    tokio::time::sleep(Duration::from_millis(100)).await;
    // No further line enqueues after cancellation settled.
    assert!(p.backend.texts().len() <= enqueued_at_cancel + 1);

    shutdown(p).await;
}

/// Invariant: focus bursts inside the 30 ms window collapse to the last
/// event by the time subscribers run.
#[tokio::test]
async fn focus_bursts_collapse_to_last() {
    #[derive(Default)]
    struct FocusRecorder {
        seen: Mutex<Vec<String>>,
    }
    impl BusSubscriber for FocusRecorder {
        fn on_focus_changed(&self, element: &ElementSnapshot) -> Result<()> {
            self.seen.lock().unwrap().push(element.name.clone());
            Ok(())
        }
    }

    let recorder = Arc::new(FocusRecorder::default());
    let mut bus = EventBus::spawn(vec![recorder.clone()], PipelineMetrics::new());
    let sender = bus.sender();

    for name in ["one", "two", "three"] {
        sender.post(ScreenReaderEvent::now(EventKind::FocusChanged(
            ElementSnapshot {
                name: name.to_string(),
                ..Default::default()
            },
        )));
    }
    tokio::time::sleep(Duration::from_millis(80)).await;
    bus.stop_async().await;

    assert_eq!(*recorder.seen.lock().unwrap(), vec!["three"]);
}

/// Invariant: a burst of Normal utterances becomes a single joined speak
/// call, and an interrupt fires the backend's cancel.
#[tokio::test(start_paused = true)]
async fn speech_coalescing_and_interrupt() {
    let backend = Arc::new(MockBackend::default());
    let mut queue = SpeechQueue::spawn(backend.clone(), PipelineMetrics::new());
    let handle = queue.handle();

    handle.say("alpha", Priority::Normal);
    handle.say("beta", Priority::Normal);
    handle.say("gamma", Priority::Normal);
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(backend.texts(), vec!["alpha. beta. gamma"]);

    handle.say("stop everything", Priority::Interrupt);
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(*backend.cancels.lock().unwrap() >= 1);
    assert_eq!(backend.texts().last().unwrap(), "stop everything");

    queue.dispose().await;
}

/// Invariant: typing echo in words mode produces exactly one word event
/// for "hello" followed by space, end to end through the echo handler.
#[test]
fn typing_echo_words_mode_end_to_end() {
    use ariavox::input::echo::TypingEchoHandler;
    use ariavox::settings::{Settings, SettingsHandle, TypingEchoMode};

    #[derive(Default)]
    struct EchoSink {
        words: Mutex<Vec<(String, bool)>>,
    }
    impl EventSink for EchoSink {
        fn post(&self, event: ScreenReaderEvent) {
            if let EventKind::TypingEcho { text, is_word } = event.kind {
                self.words.lock().unwrap().push((text, is_word));
            }
        }
    }

    let sink = Arc::new(EchoSink::default());
    let settings = SettingsHandle::new(Settings {
        typing_echo_mode: TypingEchoMode::Words,
        ..Settings::default()
    });
    let mut echo = TypingEchoHandler::new(settings, sink.clone());

    for vk_code in [0x48u32, 0x45, 0x4C, 0x4C, 0x4F] {
        echo.handle_key(KeyEvent::down(vk_code, Modifiers::empty()));
        echo.handle_key(KeyEvent::up(vk_code, Modifiers::empty()));
    }
    echo.handle_key(KeyEvent::down(vk::SPACE, Modifiers::empty()));
    echo.handle_key(KeyEvent::up(vk::SPACE, Modifiers::empty()));

    assert_eq!(
        *sink.words.lock().unwrap(),
        vec![("hello".to_string(), true)]
    );
}

/// Invariant: every flat-text offset resolves to exactly one node, before
/// and after an incremental update.
#[test]
fn offset_lookup_is_total_across_updates() {
    let doc = Arc::new(build_document(
        &StaticElement::new(vec![0], "Document", "")
            .with_child(heading(1, 1, "Alpha"))
            .with_child(
                StaticElement::new(vec![2], "Group", "")
                    .with_role("navigation")
                    .with_child(StaticElement::new(vec![2, 1], "Hyperlink", "Beta")),
            )
            .with_child(StaticElement::new(vec![3], "Text", "Gamma")),
    ));

    let check = |doc: &ariavox::vbuffer::VBufferDocument| {
        for offset in 0..doc.flat_text.len() {
            let hits = doc
                .nodes
                .iter()
                .filter(|n| n.range.0 <= offset && offset < n.range.1)
                .count();
            assert_eq!(hits, 1, "offset {offset}");
            assert!(doc.find_node_at_offset(offset).is_some());
        }
        assert!(doc.find_node_at_offset(doc.flat_text.len()).is_none());
    };

    check(&doc);
    let replacement = StaticElement::new(vec![2], "Group", "")
        .with_role("navigation")
        .with_child(StaticElement::new(vec![2, 9], "Hyperlink", "A longer link name"));
    let updated = ariavox::vbuffer::apply_update(&doc, &[2], Some(&replacement));
    check(&updated);
}

/// Cursor boundary behavior: PrevChar at offset zero stays put without
/// wrap and lands on the last character with it.
#[test]
fn prev_char_boundary_and_wrap() {
    let cues = Arc::new(RecordingCueSink::new());
    let doc = Arc::new(build_document(
        &StaticElement::new(vec![0], "Document", "")
            .with_child(StaticElement::new(vec![1], "Text", "abc")),
    ));
    let mut cursor = ariavox::vbuffer::Cursor::new(doc, cues.clone());

    assert_eq!(cursor.prev_char(), None);
    assert_eq!(cues.played(), vec![Cue::Boundary]);

    cursor.set_wrap(true);
    assert!(cursor.prev_char().is_some());
    assert_eq!(cues.played(), vec![Cue::Boundary, Cue::Wrap]);
}
