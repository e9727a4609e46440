//! Snapshot builder: abstract element tree → virtual buffer document.
//!
//! Walks the tree in iterative pre-order, assigning dense ids as it goes, so
//! the arena order is the document order by construction. Text-bearing
//! elements append their name plus a line separator to the flat text;
//! container types contribute structure only.

use tracing::debug;

use super::{is_container_type, VBufferDocument, VBufferNode};
use crate::a11y::{aria, AccessibleElement};

/// Builds a complete document snapshot from `root`.
pub fn build_document<E: AccessibleElement>(root: &E) -> VBufferDocument {
    let (nodes, flat_text) = build_fragment(root);
    let mut doc = VBufferDocument {
        flat_text,
        root: 0,
        nodes,
        ..Default::default()
    };
    doc.relink_order();
    doc.rebuild_indices();
    debug!(
        "Built document: {} nodes, {} flat chars, {} headings, {} links",
        doc.nodes.len(),
        doc.flat_text.len(),
        doc.headings.len(),
        doc.links.len()
    );
    doc
}

/// Builds a node list plus flat-text fragment with offsets starting at 0.
/// Ids, parent links, and children lists are local to the fragment;
/// prev/next are left unset for the caller to link.
pub(crate) fn build_fragment<E: AccessibleElement>(root: &E) -> (Vec<VBufferNode>, String) {
    let mut nodes: Vec<VBufferNode> = Vec::new();
    let mut flat_text = String::new();

    // The root is visited through its borrow; descendants are owned values
    // on an explicit stack, pushed reversed so they pop in document order.
    let root_children = visit(root, None, &mut nodes, &mut flat_text);
    let mut stack: Vec<(E, usize)> = root_children
        .into_iter()
        .rev()
        .map(|child| (child, 0))
        .collect();

    while let Some((element, parent)) = stack.pop() {
        let children = visit(&element, Some(parent), &mut nodes, &mut flat_text);
        let id = nodes.len() - 1;
        for child in children.into_iter().rev() {
            stack.push((child, id));
        }
    }

    (nodes, flat_text)
}

/// Appends one node for `element` and returns its children for the walk.
fn visit<E: AccessibleElement>(
    element: &E,
    parent: Option<usize>,
    nodes: &mut Vec<VBufferNode>,
    flat_text: &mut String,
) -> Vec<E> {
    let id = nodes.len();
    let control_type = element.control_type();
    let name = element.name();
    let flags = aria::translate(&element.aria_role(), &element.aria_properties());

    let range = if !is_container_type(&control_type) && !name.is_empty() {
        let start = flat_text.len();
        flat_text.push_str(&name);
        flat_text.push('\n');
        (start, flat_text.len())
    } else {
        (flat_text.len(), flat_text.len())
    };

    let node = VBufferNode {
        id,
        runtime_id: element.runtime_id(),
        is_link: flags.is_link || control_type == "Hyperlink",
        name,
        aria_role: element.aria_role(),
        heading_level: flags.heading_level,
        landmark: flags.landmark,
        is_visited: flags.is_visited,
        is_required: flags.is_required,
        is_expandable: flags.is_expandable,
        is_expanded: flags.is_expanded,
        is_focusable: element.is_focusable(),
        description: element.description(),
        control_type,
        range,
        parent,
        children: Vec::new(),
        prev: None,
        next: None,
    };

    if let Some(parent_id) = parent {
        nodes[parent_id].children.push(id);
    }
    nodes.push(node);

    element.children()
}
