/*!
 * Virtual Buffer Module
 *
 * A flattened, indexed, immutable snapshot of a document's accessibility
 * tree. Nodes live in one arena vector in document (pre-order) order; the
 * dense vector index is the node id, and parent/children/prev/next are ids
 * rather than owning pointers. Replacing a document means swapping the whole
 * snapshot, so readers of the old snapshot are never disturbed.
 */

pub mod builder;
pub mod cursor;
pub mod update;

use std::collections::HashMap;

pub use builder::build_document;
pub use cursor::Cursor;
pub use update::apply_update;

use crate::a11y::is_form_field_type;

/// Dense document-order node id; equals the node's position in pre-order.
pub type NodeId = usize;

/// Control types that contribute no text to the flat buffer.
const CONTAINER_TYPES: [&str; 8] = [
    "Document",
    "Group",
    "Pane",
    "Window",
    "ToolBar",
    "Menu",
    "MenuBar",
    "TitleBar",
];

pub fn is_container_type(control_type: &str) -> bool {
    CONTAINER_TYPES.contains(&control_type)
}

/// One node of the snapshot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VBufferNode {
    pub id: NodeId,
    pub runtime_id: Vec<i32>,
    pub name: String,
    pub control_type: String,
    pub aria_role: String,
    /// 0 means "not a heading"; 1–6 otherwise.
    pub heading_level: u8,
    /// One of the eight landmark strings, or empty.
    pub landmark: String,
    pub is_link: bool,
    pub is_visited: bool,
    pub is_required: bool,
    pub is_expandable: bool,
    pub is_expanded: bool,
    pub is_focusable: bool,
    pub description: String,
    /// Half-open range into the document's flat text. Text-bearing nodes
    /// cover their name plus the appended line separator; containers have
    /// an empty range.
    pub range: (usize, usize),
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub prev: Option<NodeId>,
    pub next: Option<NodeId>,
}

impl VBufferNode {
    pub fn is_heading(&self) -> bool {
        (1..=6).contains(&self.heading_level)
    }

    /// Form-field rule: one of the fixed control types, or a required or
    /// expandable element.
    pub fn is_form_field(&self) -> bool {
        is_form_field_type(&self.control_type) || self.is_required || self.is_expandable
    }

    /// Edit-field rule used by the mode state machine.
    pub fn is_edit_field(&self) -> bool {
        is_form_field_type(&self.control_type) || self.is_focusable
    }

    pub fn has_text(&self) -> bool {
        self.range.0 < self.range.1
    }
}

/// Joined runtime id used as the lookup key.
pub fn runtime_key(runtime_id: &[i32]) -> String {
    runtime_id
        .iter()
        .map(|part| part.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// The immutable snapshot: flat text, node arena, and pre-built indices.
#[derive(Clone, Debug, Default)]
pub struct VBufferDocument {
    pub flat_text: String,
    pub root: NodeId,
    /// All nodes in document order; `nodes[i].id == i`.
    pub nodes: Vec<VBufferNode>,
    pub headings: Vec<NodeId>,
    pub links: Vec<NodeId>,
    pub form_fields: Vec<NodeId>,
    pub landmarks: Vec<NodeId>,
    pub focusable: Vec<NodeId>,
    /// Text-bearing nodes ordered by range start; drives offset lookup.
    pub(crate) text_nodes: Vec<NodeId>,
    pub(crate) runtime_map: HashMap<String, NodeId>,
}

impl VBufferDocument {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn node(&self, id: NodeId) -> Option<&VBufferNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// O(1) lookup by the platform's runtime identifier.
    pub fn find_by_runtime_id(&self, runtime_id: &[i32]) -> Option<&VBufferNode> {
        self.runtime_map
            .get(&runtime_key(runtime_id))
            .and_then(|&id| self.nodes.get(id))
    }

    /// Returns the text-bearing node whose range brackets `offset`, or
    /// `None` when the offset is outside the flat text.
    pub fn find_node_at_offset(&self, offset: usize) -> Option<&VBufferNode> {
        if offset >= self.flat_text.len() {
            return None;
        }
        let idx = self
            .text_nodes
            .partition_point(|&id| self.nodes[id].range.0 <= offset);
        if idx == 0 {
            return None;
        }
        let node = &self.nodes[self.text_nodes[idx - 1]];
        (offset < node.range.1).then_some(node)
    }

    /// Position of `id` among its parent's children, 1-based, with the
    /// sibling count. `None` for the root.
    pub fn position_in_parent(&self, id: NodeId) -> Option<(usize, usize)> {
        let parent = self.nodes.get(id)?.parent?;
        let siblings = &self.nodes[parent].children;
        let position = siblings.iter().position(|&c| c == id)?;
        Some((position + 1, siblings.len()))
    }

    /// Rebuilds every derived index from the node arena. Called by the
    /// builder and after every incremental splice.
    pub(crate) fn rebuild_indices(&mut self) {
        self.headings.clear();
        self.links.clear();
        self.form_fields.clear();
        self.landmarks.clear();
        self.focusable.clear();
        self.text_nodes.clear();
        self.runtime_map.clear();

        for node in &self.nodes {
            if node.is_heading() {
                self.headings.push(node.id);
            }
            if node.is_link {
                self.links.push(node.id);
            }
            if node.is_form_field() {
                self.form_fields.push(node.id);
            }
            if !node.landmark.is_empty() {
                self.landmarks.push(node.id);
            }
            if node.is_focusable {
                self.focusable.push(node.id);
            }
            if node.has_text() {
                self.text_nodes.push(node.id);
            }
            if !node.runtime_id.is_empty() {
                self.runtime_map.insert(runtime_key(&node.runtime_id), node.id);
            }
        }
    }

    /// Relinks prev/next as a strict walk of the node list.
    pub(crate) fn relink_order(&mut self) {
        let len = self.nodes.len();
        for (i, node) in self.nodes.iter_mut().enumerate() {
            node.id = i;
            node.prev = if i > 0 { Some(i - 1) } else { None };
            node.next = if i + 1 < len { Some(i + 1) } else { None };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_node(id: NodeId, start: usize, end: usize) -> VBufferNode {
        VBufferNode {
            id,
            name: "n".to_string(),
            control_type: "Text".to_string(),
            range: (start, end),
            ..Default::default()
        }
    }

    fn doc_with_ranges(ranges: &[(usize, usize)], text: &str) -> VBufferDocument {
        let mut doc = VBufferDocument {
            flat_text: text.to_string(),
            nodes: ranges
                .iter()
                .enumerate()
                .map(|(i, &(s, e))| text_node(i, s, e))
                .collect(),
            ..Default::default()
        };
        doc.rebuild_indices();
        doc
    }

    #[test]
    fn offset_lookup_brackets_every_position() {
        let doc = doc_with_ranges(&[(0, 6), (6, 11)], "Hello\nWorld");
        for offset in 0..6 {
            assert_eq!(doc.find_node_at_offset(offset).unwrap().id, 0);
        }
        for offset in 6..11 {
            assert_eq!(doc.find_node_at_offset(offset).unwrap().id, 1);
        }
        assert!(doc.find_node_at_offset(11).is_none());
        assert!(doc.find_node_at_offset(100).is_none());
    }

    #[test]
    fn offset_lookup_skips_empty_ranges() {
        // A container with an empty range at the same start as a text node.
        let mut doc = doc_with_ranges(&[(0, 0), (0, 5)], "Hello");
        doc.nodes[0].control_type = "Group".to_string();
        doc.rebuild_indices();
        assert_eq!(doc.find_node_at_offset(0).unwrap().id, 1);
    }

    #[test]
    fn runtime_lookup_is_keyed_on_joined_id() {
        let mut doc = doc_with_ranges(&[(0, 5)], "Hello");
        doc.nodes[0].runtime_id = vec![42, 7];
        doc.rebuild_indices();

        assert_eq!(doc.find_by_runtime_id(&[42, 7]).unwrap().id, 0);
        assert!(doc.find_by_runtime_id(&[42]).is_none());
        assert_eq!(runtime_key(&[42, 7]), "42,7");
    }

    #[test]
    fn form_field_rule_covers_flags_and_types() {
        let mut node = VBufferNode {
            control_type: "Text".to_string(),
            ..Default::default()
        };
        assert!(!node.is_form_field());
        node.is_required = true;
        assert!(node.is_form_field());

        let combo = VBufferNode {
            control_type: "ComboBox".to_string(),
            ..Default::default()
        };
        assert!(combo.is_form_field());
    }

    #[test]
    fn container_types_are_recognized() {
        for ct in CONTAINER_TYPES {
            assert!(is_container_type(ct));
        }
        assert!(!is_container_type("Text"));
        assert!(!is_container_type("Hyperlink"));
    }
}
