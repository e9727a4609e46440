//! Accessibility event fan-in.
//!
//! Platform callbacks land here on whatever thread the platform chooses.
//! Each handler only reads the already-cached property batch, translates it
//! into a value-typed event, and posts to the bus. A failed read degrades to
//! a minimal event instead of dropping the signal: silence is worse than a
//! nameless announcement.

use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use super::{aria, control_type_name};
use crate::events::{
    ElementSnapshot, EventKind, EventSink, Politeness, PropertyKind, ScreenReaderEvent,
};

/// The property batch the platform caches for us before a callback fires.
#[derive(Clone, Debug, Default)]
pub struct CachedProperties {
    pub runtime_id: Vec<i32>,
    pub name: String,
    pub control_type_id: i32,
    pub aria_role: String,
    pub aria_properties: String,
    pub focusable: bool,
}

/// Translates platform callbacks into bus events.
pub struct EventTranslator {
    sink: Arc<dyn EventSink>,
}

impl EventTranslator {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    /// Focus moved. `properties` is the cache read, which may have failed
    /// mid-callback; a failure produces a minimal snapshot.
    pub fn on_focus_changed(&self, properties: Result<CachedProperties>) {
        let snapshot = match properties {
            Ok(props) => snapshot_from(&props),
            Err(e) => {
                debug!("Focus change with unreadable element: {e:#}");
                ElementSnapshot::default()
            }
        };
        self.post(EventKind::FocusChanged(snapshot));
    }

    pub fn on_structure_changed(&self, runtime_id: Vec<i32>) {
        self.post(EventKind::StructureChanged { runtime_id });
    }

    pub fn on_property_changed(&self, runtime_id: Vec<i32>, property: PropertyKind, value: String) {
        self.post(EventKind::PropertyChanged {
            runtime_id,
            property,
            value,
        });
    }

    pub fn on_live_region_changed(&self, source_id: String, text: String, politeness: Politeness) {
        self.post(EventKind::LiveRegionChanged {
            source_id,
            text,
            politeness,
        });
    }

    pub fn on_notification(&self, text: String) {
        self.post(EventKind::Notification { text });
    }

    fn post(&self, kind: EventKind) {
        self.sink.post(ScreenReaderEvent::now(kind));
    }
}

/// Builds the value snapshot from a cached batch.
fn snapshot_from(props: &CachedProperties) -> ElementSnapshot {
    let flags = aria::translate(&props.aria_role, &props.aria_properties);
    ElementSnapshot {
        runtime_id: props.runtime_id.clone(),
        name: props.name.clone(),
        control_type: control_type_name(props.control_type_id).to_string(),
        heading_level: flags.heading_level,
        landmark: flags.landmark,
        is_link: flags.is_link || control_type_name(props.control_type_id) == "Hyperlink",
        is_focusable: props.focusable,
    }
}
