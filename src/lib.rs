/*!
 * Ariavox Screen Reader Core
 *
 * Real-time pipeline turning accessibility events and keyboard input into
 * speech and audio cues: input capture and dispatch, the accessibility
 * event surface, the virtual buffer, and prioritized speech output.
 */

pub mod a11y;
pub mod agent;
pub mod audio;
pub mod elements_list;
pub mod events;
pub mod input;
pub mod metrics;
pub mod mode;
pub mod nav;
pub mod say_all;
pub mod settings;
pub mod speech;
pub mod vbuffer;
pub mod wizard;

// Re-export the types most shells need to wire a pipeline together.
pub use agent::ScreenReaderAgent;
pub use audio::{Cue, CuePlayer, CueSink};
pub use events::{EventBus, EventSink, Mode, ScreenReaderEvent};
pub use metrics::PipelineMetrics;
pub use settings::{Settings, SettingsHandle};
pub use speech::{Priority, SpeechBackend, SpeechQueue, Utterance};
pub use vbuffer::{build_document, VBufferDocument};
