//! Screen reader agent: the bus subscriber that ties the pipeline together.
//!
//! Owns the reading cursor (and with it the current document snapshot), the
//! mode state machine, quick navigation, say-all, the live-region monitor,
//! and the elements-list dialog. Everything it does funnels out as speech,
//! earcons, or further bus events.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use tracing::debug;

use crate::a11y::{AccessibleElement, LiveRegionMonitor};
use crate::audio::CueSink;
use crate::elements_list::{DialogOutcome, ElementsList};
use crate::events::{
    BusSubscriber, ElementSnapshot, EventKind, EventSink, Politeness, ScreenReaderEvent,
};
use crate::input::keymap::NavigationCommand;
use crate::input::KeyEvent;
use crate::mode::{ModeHandle, ModeManager};
use crate::nav::{build_announcement, describe_snapshot, QuickNav, VerbosityProfile};
use crate::say_all::SayAll;
use crate::settings::SettingsHandle;
use crate::speech::{Priority, SpeechHandle};
use crate::vbuffer::{apply_update, Cursor, VBufferDocument};

pub struct ScreenReaderAgent {
    settings: SettingsHandle,
    speech: SpeechHandle,
    mode: ModeManager,
    monitor: LiveRegionMonitor,
    quicknav: QuickNav,
    cursor: Arc<Mutex<Cursor>>,
    say_all: Mutex<SayAll>,
    dialog: Mutex<Option<ElementsList>>,
}

impl ScreenReaderAgent {
    pub fn new(
        settings: SettingsHandle,
        speech: SpeechHandle,
        cues: Arc<dyn CueSink>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let cursor = Arc::new(Mutex::new(Cursor::new(
            Arc::new(VBufferDocument::empty()),
            cues.clone(),
        )));
        let say_all = SayAll::new(speech.clone(), cursor.clone());
        Self {
            mode: ModeManager::new(cues.clone(), speech.clone(), sink),
            monitor: LiveRegionMonitor::new(),
            quicknav: QuickNav::new(cues),
            say_all: Mutex::new(say_all),
            settings,
            speech,
            cursor,
            dialog: Mutex::new(None),
        }
    }

    pub fn mode_handle(&self) -> ModeHandle {
        self.mode.handle()
    }

    /// Current document snapshot.
    pub fn document(&self) -> Arc<VBufferDocument> {
        self.lock_cursor().document().clone()
    }

    /// Swaps in a freshly built snapshot. Any open elements list is bound to
    /// the old snapshot and closes.
    pub fn set_document(&self, doc: Arc<VBufferDocument>) {
        self.lock_cursor().set_document(doc);
        *self.lock_dialog() = None;
    }

    /// Applies an incremental structure change to the current snapshot.
    pub fn apply_structure_change<E: AccessibleElement>(
        &self,
        runtime_id: &[i32],
        new_subtree: Option<&E>,
    ) {
        let current = self.document();
        let updated = apply_update(&current, runtime_id, new_subtree);
        if !Arc::ptr_eq(&current, &updated) {
            self.lock_cursor().set_document(updated);
        }
    }

    /// Effective verbosity profile under the current settings.
    fn profile(&self) -> VerbosityProfile {
        let settings = self.settings.snapshot();
        let profile = VerbosityProfile::for_level(settings.verbosity_level);
        if settings.announce_visited_links {
            profile
        } else {
            profile.without_visited()
        }
    }

    fn lock_cursor(&self) -> std::sync::MutexGuard<'_, Cursor> {
        self.cursor.lock().expect("cursor lock poisoned")
    }

    fn lock_dialog(&self) -> std::sync::MutexGuard<'_, Option<ElementsList>> {
        self.dialog.lock().expect("dialog lock poisoned")
    }

    fn cancel_say_all(&self) {
        self.say_all.lock().expect("say-all lock poisoned").cancel();
    }

    pub fn is_reading(&self) -> bool {
        self.say_all.lock().expect("say-all lock poisoned").is_reading()
    }

    pub fn dialog_open(&self) -> bool {
        self.lock_dialog().is_some()
    }

    fn open_elements_list(&self) {
        let doc = self.document();
        let list = ElementsList::new(doc);
        let title = list.tab().title();
        self.speech
            .say(format!("Elements list. {title} tab."), Priority::High);
        *self.lock_dialog() = Some(list);
    }

    /// Routes a raw key into the open dialog. Returns true when the key was
    /// consumed by the dialog.
    fn dialog_key(&self, key: KeyEvent) -> bool {
        let mut guard = self.lock_dialog();
        let Some(list) = guard.as_mut() else {
            return false;
        };
        match list.handle_key(key) {
            DialogOutcome::Open => {
                if key.pressed {
                    if let Some((_, text)) = list.selected() {
                        self.speech.say(text, Priority::High);
                    }
                }
                true
            }
            DialogOutcome::Selected(id) => {
                *guard = None;
                drop(guard);
                let doc = self.document();
                if let Some(node) = doc.node(id) {
                    self.lock_cursor().move_to(node.range.0);
                    let text = build_announcement(&doc, id, &self.profile());
                    self.speech.say(text, Priority::High);
                }
                true
            }
            DialogOutcome::Cancelled => {
                *guard = None;
                self.speech.say("Closed", Priority::High);
                true
            }
        }
    }

    fn run_command(&self, command: NavigationCommand) {
        use NavigationCommand as Cmd;

        let moved: Option<String> = match command {
            Cmd::ToggleMode => {
                self.mode.toggle();
                return;
            }
            Cmd::StopSpeech => {
                self.speech.cancel_current();
                return;
            }
            Cmd::SayAll => {
                self.say_all.lock().expect("say-all lock poisoned").start();
                return;
            }
            Cmd::ElementsList => {
                self.open_elements_list();
                return;
            }
            Cmd::ActivateElement => {
                let is_edit = self
                    .lock_cursor()
                    .current_node()
                    .is_some_and(|n| n.is_edit_field());
                self.mode.on_activate_element(is_edit);
                debug!("Activate element (edit field: {is_edit})");
                return;
            }
            Cmd::ReadCurrentLine => self.lock_cursor().current_line(),
            Cmd::ReadCurrentWord => self.lock_cursor().current_word(),
            Cmd::NextLine => self.lock_cursor().next_line(),
            Cmd::PrevLine => self.lock_cursor().prev_line(),
            Cmd::NextWord => self.lock_cursor().next_word(),
            Cmd::PrevWord => self.lock_cursor().prev_word(),
            Cmd::NextChar => self.lock_cursor().next_char(),
            Cmd::PrevChar => self.lock_cursor().prev_char(),
            _ => {
                // Quick navigation over the pre-built indices.
                let doc = self.document();
                let target = {
                    let mut cursor = self.lock_cursor();
                    self.quicknav.navigate(&mut cursor, command)
                };
                if let Some(id) = target {
                    let text = build_announcement(&doc, id, &self.profile());
                    if !text.is_empty() {
                        self.speech.say(text, Priority::High);
                    }
                }
                return;
            }
        };

        if let Some(text) = moved {
            if !text.is_empty() {
                self.speech.say(text, Priority::High);
            }
        }
    }
}

impl BusSubscriber for ScreenReaderAgent {
    fn on_focus_changed(&self, element: &ElementSnapshot) -> Result<()> {
        self.mode.on_focus_changed(element);

        let doc = self.document();
        let text = match doc.find_by_runtime_id(&element.runtime_id) {
            Some(node) => {
                let start = node.range.0;
                let id = node.id;
                self.lock_cursor().move_to(start);
                build_announcement(&doc, id, &self.profile())
            }
            None => describe_snapshot(element, &self.profile()),
        };
        if !text.is_empty() {
            self.speech.say(text, Priority::High);
        }
        Ok(())
    }

    fn on_navigation_command(&self, command: NavigationCommand) -> Result<()> {
        self.cancel_say_all();

        if self.dialog_open() {
            // The dialog is modal; it is driven by raw keys only.
            return Ok(());
        }
        if self.mode.blocks(command) {
            debug!("Swallowed {:?} in focus mode", command);
            return Ok(());
        }
        self.run_command(command);
        Ok(())
    }

    fn on_raw_key(&self, key: KeyEvent) -> Result<()> {
        if key.pressed {
            self.cancel_say_all();
        }
        self.dialog_key(key);
        Ok(())
    }

    fn on_event(&self, event: &ScreenReaderEvent) -> Result<()> {
        match &event.kind {
            EventKind::LiveRegionChanged {
                source_id,
                text,
                politeness,
            } => {
                if self
                    .monitor
                    .should_announce(Some(source_id), text, *politeness)
                {
                    let priority = match politeness {
                        Politeness::Assertive => Priority::Interrupt,
                        Politeness::Polite => Priority::Normal,
                    };
                    self.speech.say(text.clone(), priority);
                }
            }
            EventKind::TypingEcho { text, .. } => {
                self.speech.say(text.clone(), Priority::High);
            }
            EventKind::Notification { text } => {
                self.speech.say(text.clone(), Priority::Normal);
            }
            EventKind::StructureChanged { runtime_id } => {
                // The shell re-fetches the subtree through the host and
                // calls apply_structure_change; nothing to do here.
                debug!("Structure changed at {runtime_id:?}");
            }
            EventKind::PropertyChanged {
                runtime_id,
                property,
                value,
            } => {
                debug!("Property {property:?} changed at {runtime_id:?}: {value}");
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::a11y::StaticElement;
    use crate::audio::{Cue, RecordingCueSink};
    use crate::metrics::PipelineMetrics;
    use crate::speech::{CancelToken, SpeechBackend, SpeechQueue, Utterance};
    use crate::vbuffer::build_document;
    use async_trait::async_trait;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingBackend {
        spoken: Mutex<Vec<(String, Priority)>>,
    }

    #[async_trait]
    impl SpeechBackend for RecordingBackend {
        async fn speak(&self, utterance: &Utterance, _cancel: &CancelToken) -> Result<()> {
            self.spoken
                .lock()
                .unwrap()
                .push((utterance.text.clone(), utterance.priority));
            Ok(())
        }
        fn cancel(&self) {}
        fn set_rate(&self, _wpm: u32) -> Result<()> {
            Ok(())
        }
        fn set_voice(&self, _name: &str) -> Result<()> {
            Ok(())
        }
        fn available_voices(&self) -> Vec<String> {
            Vec::new()
        }
        fn is_speaking(&self) -> bool {
            false
        }
    }

    struct NullSink;
    impl EventSink for NullSink {
        fn post(&self, _event: ScreenReaderEvent) {}
    }

    struct Fixture {
        agent: Arc<ScreenReaderAgent>,
        backend: Arc<RecordingBackend>,
        cues: Arc<RecordingCueSink>,
        queue: SpeechQueue,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(RecordingBackend::default());
        let queue = SpeechQueue::spawn(backend.clone(), PipelineMetrics::new());
        let cues = Arc::new(RecordingCueSink::new());
        let agent = Arc::new(ScreenReaderAgent::new(
            SettingsHandle::new(Default::default()),
            queue.handle(),
            cues.clone(),
            Arc::new(NullSink),
        ));
        Fixture {
            agent,
            backend,
            cues,
            queue,
        }
    }

    fn page() -> Arc<VBufferDocument> {
        let tree = StaticElement::new(vec![0], "Document", "")
            .with_child(
                StaticElement::new(vec![1], "Text", "Intro")
                    .with_role("heading")
                    .with_properties("level=1"),
            )
            .with_child(StaticElement::new(vec![2], "Hyperlink", "Docs"))
            .with_child(StaticElement::new(vec![3], "Edit", "Search").focusable());
        Arc::new(build_document(&tree))
    }

    fn spoken(backend: &RecordingBackend) -> Vec<String> {
        backend.spoken.lock().unwrap().iter().map(|(t, _)| t.clone()).collect()
    }

    #[tokio::test]
    async fn quicknav_command_announces_the_target() {
        let mut fx = fixture();
        fx.agent.set_document(page());

        fx.agent
            .on_navigation_command(NavigationCommand::NextHeading)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(spoken(&fx.backend), vec!["heading level 1, Intro"]);
        fx.queue.dispose().await;
    }

    #[tokio::test]
    async fn focus_mode_swallows_navigation() {
        let mut fx = fixture();
        fx.agent.set_document(page());
        fx.agent.mode.toggle(); // into focus mode
        tokio::time::sleep(Duration::from_millis(50)).await;

        fx.agent
            .on_navigation_command(NavigationCommand::NextHeading)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Only the mode announcement was spoken; the heading jump never ran.
        assert_eq!(spoken(&fx.backend), vec!["Focus mode"]);
        fx.queue.dispose().await;
    }

    #[tokio::test]
    async fn live_region_goes_through_the_monitor() {
        let mut fx = fixture();
        let event = ScreenReaderEvent::now(EventKind::LiveRegionChanged {
            source_id: "42,7".to_string(),
            text: "Loading".to_string(),
            politeness: Politeness::Polite,
        });
        fx.agent.on_event(&event).unwrap();
        // Identical text: diffed away.
        fx.agent.on_event(&event).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(spoken(&fx.backend), vec!["Loading"]);
        fx.queue.dispose().await;
    }

    #[tokio::test]
    async fn elements_list_is_modal_and_selects() {
        use crate::input::{vk, KeyEvent, Modifiers};

        let mut fx = fixture();
        fx.agent.set_document(page());

        fx.agent
            .on_navigation_command(NavigationCommand::ElementsList)
            .unwrap();
        assert!(fx.agent.dialog_open());

        // Commands are ignored while the dialog is open.
        fx.agent
            .on_navigation_command(NavigationCommand::NextHeading)
            .unwrap();
        assert!(fx.agent.dialog_open());

        // Enter selects the first heading and closes the dialog.
        fx.agent
            .on_raw_key(KeyEvent::down(vk::RETURN, Modifiers::empty()))
            .unwrap();
        assert!(!fx.agent.dialog_open());
        assert_eq!(fx.agent.lock_cursor().current_node().unwrap().name, "Intro");
        fx.queue.dispose().await;
    }

    #[tokio::test]
    async fn structure_change_swaps_the_snapshot() {
        let mut fx = fixture();
        fx.agent.set_document(page());

        let replacement = StaticElement::new(vec![1], "Text", "Updated")
            .with_role("heading")
            .with_properties("level=2");
        fx.agent.apply_structure_change(&[1], Some(&replacement));

        let doc = fx.agent.document();
        assert!(doc.flat_text.contains("Updated"));
        assert!(!doc.flat_text.contains("Intro"));
        fx.queue.dispose().await;
    }

    #[tokio::test]
    async fn boundary_cue_plays_when_navigation_fails() {
        let mut fx = fixture();
        fx.agent.set_document(page());

        fx.agent
            .on_navigation_command(NavigationCommand::NextTable)
            .unwrap();
        assert_eq!(fx.cues.played(), vec![Cue::Boundary]);
        fx.queue.dispose().await;
    }
}
