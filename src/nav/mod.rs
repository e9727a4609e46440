/*!
 * Quick Navigation Module
 *
 * Jump-by-element-kind over the virtual buffer's pre-built indices, plus
 * the announcement builder that renders a node for speech.
 */

pub mod announce;

use std::sync::Arc;

use tracing::debug;

use crate::audio::{Cue, CueSink};
use crate::input::keymap::NavigationCommand;
#[cfg(not(test))]
use crate::vbuffer::{Cursor, NodeId};
#[cfg(test)]
use crate::vbuffer::{Cursor, NodeId, VBufferDocument};

pub use announce::{build_announcement, describe_snapshot, VerbosityProfile};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Next,
    Prev,
}

/// Which pre-built index a command walks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum IndexKind {
    Headings,
    Links,
    Landmarks,
    FormFields,
    Focusable,
    Tables,
}

/// Maps a command to its index, direction, and heading-level filter.
fn classify(command: NavigationCommand) -> Option<(IndexKind, Direction, Option<u8>)> {
    use NavigationCommand as Cmd;
    let (kind, direction) = match command {
        Cmd::NextHeading => (IndexKind::Headings, Direction::Next),
        Cmd::PrevHeading => (IndexKind::Headings, Direction::Prev),
        Cmd::NextLink => (IndexKind::Links, Direction::Next),
        Cmd::PrevLink => (IndexKind::Links, Direction::Prev),
        Cmd::NextLandmark => (IndexKind::Landmarks, Direction::Next),
        Cmd::PrevLandmark => (IndexKind::Landmarks, Direction::Prev),
        Cmd::NextFormField => (IndexKind::FormFields, Direction::Next),
        Cmd::PrevFormField => (IndexKind::FormFields, Direction::Prev),
        Cmd::NextFocusable => (IndexKind::Focusable, Direction::Next),
        Cmd::PrevFocusable => (IndexKind::Focusable, Direction::Prev),
        Cmd::NextTable => (IndexKind::Tables, Direction::Next),
        Cmd::PrevTable => (IndexKind::Tables, Direction::Prev),
        _ => {
            if let Some(level) = command.heading_level() {
                return Some((IndexKind::Headings, Direction::Next, Some(level)));
            }
            return None;
        }
    };
    Some((kind, direction, None))
}

/// Quick-nav engine. Stateless apart from the wrap policy.
pub struct QuickNav {
    wrap: bool,
    cues: Arc<dyn CueSink>,
}

impl QuickNav {
    pub fn new(cues: Arc<dyn CueSink>) -> Self {
        Self { wrap: false, cues }
    }

    pub fn set_wrap(&mut self, wrap: bool) {
        self.wrap = wrap;
    }

    /// Returns true for commands this engine handles.
    pub fn handles(command: NavigationCommand) -> bool {
        classify(command).is_some()
    }

    /// Executes one quick-nav command against the cursor's document. On a
    /// match the cursor moves to the node's text and its id is returned; on
    /// failure the cursor stays put and the boundary cue plays.
    pub fn navigate(&self, cursor: &mut Cursor, command: NavigationCommand) -> Option<NodeId> {
        let (kind, direction, level) = classify(command)?;
        let doc = cursor.document().clone();

        // No table index is built; table navigation always reports a
        // boundary.
        if kind == IndexKind::Tables {
            self.cues.play(Cue::Boundary);
            return None;
        }

        let index: &[NodeId] = match kind {
            IndexKind::Headings => &doc.headings,
            IndexKind::Links => &doc.links,
            IndexKind::Landmarks => &doc.landmarks,
            IndexKind::FormFields => &doc.form_fields,
            IndexKind::Focusable => &doc.focusable,
            IndexKind::Tables => unreachable!(),
        };

        let matches = |id: NodeId| -> bool {
            match level {
                Some(level) => doc.nodes[id].heading_level == level,
                None => true,
            }
        };

        let current = cursor.current_node().map(|n| n.id);
        let found = match direction {
            Direction::Next => self.scan_next(index, current, &matches),
            Direction::Prev => self.scan_prev(index, current, &matches),
        };

        match found {
            Some((id, wrapped)) => {
                if wrapped {
                    self.cues.play(Cue::Wrap);
                }
                cursor.move_to(doc.nodes[id].range.0);
                debug!("Quick-nav {:?} -> node {}", command, id);
                Some(id)
            }
            None => {
                self.cues.play(Cue::Boundary);
                None
            }
        }
    }

    /// Forward scan; returns the match and whether the search wrapped.
    fn scan_next(
        &self,
        index: &[NodeId],
        current: Option<NodeId>,
        matches: &dyn Fn(NodeId) -> bool,
    ) -> Option<(NodeId, bool)> {
        let start = match current {
            Some(current) => match index.iter().position(|&id| id == current) {
                Some(pos) => pos + 1,
                None => index.partition_point(|&id| id < current),
            },
            None => 0,
        };

        if let Some(&id) = index[start.min(index.len())..].iter().find(|&&id| matches(id)) {
            return Some((id, false));
        }
        if self.wrap {
            if let Some(&id) = index[..start.min(index.len())].iter().find(|&&id| matches(id)) {
                return Some((id, true));
            }
        }
        None
    }

    /// Backward scan, symmetric to [`Self::scan_next`].
    fn scan_prev(
        &self,
        index: &[NodeId],
        current: Option<NodeId>,
        matches: &dyn Fn(NodeId) -> bool,
    ) -> Option<(NodeId, bool)> {
        let end = match current {
            Some(current) => match index.iter().position(|&id| id == current) {
                Some(pos) => pos,
                None => index.partition_point(|&id| id < current),
            },
            None => index.len(),
        };

        if let Some(&id) = index[..end].iter().rev().find(|&&id| matches(id)) {
            return Some((id, false));
        }
        if self.wrap {
            if let Some(&id) = index[end..].iter().rev().find(|&&id| matches(id)) {
                return Some((id, true));
            }
        }
        None
    }
}
