//! Incremental updater: splices a changed subtree into a snapshot.
//!
//! Produces a fresh immutable document; the input snapshot is never touched,
//! so concurrent readers keep a consistent view. Pre-order storage makes the
//! splice contiguous: a node's subtree occupies one arena slice and one flat
//! text span, both of which are replaced (or removed) wholesale.
//!
//! Anything that would corrupt the snapshot (a replacement root carrying
//! the wrong runtime id, deleting the document root) abandons the update
//! and returns the prior snapshot unchanged.

use std::sync::Arc;

use tracing::{debug, warn};

use super::builder::build_fragment;
use super::{runtime_key, NodeId, VBufferDocument, VBufferNode};
use crate::a11y::AccessibleElement;

/// Applies a structure change to `doc`. `new_subtree` is the replacement
/// root, or `None` for a deletion.
pub fn apply_update<E: AccessibleElement>(
    doc: &Arc<VBufferDocument>,
    runtime_id: &[i32],
    new_subtree: Option<&E>,
) -> Arc<VBufferDocument> {
    let Some(&idx) = doc.runtime_map.get(&runtime_key(runtime_id)) else {
        debug!("Structure change for unknown runtime id {runtime_id:?}, ignoring");
        return doc.clone();
    };

    let count = subtree_size(doc, idx);
    let (span_start, span_end) = subtree_span(doc, idx, count);

    match new_subtree {
        None => {
            if idx == doc.root {
                warn!("Refusing to delete the document root; keeping prior snapshot");
                return doc.clone();
            }
            Arc::new(splice(doc, idx, count, span_start, span_end, Vec::new(), String::new()))
        }
        Some(root) => {
            let (fragment, fragment_text) = build_fragment(root);
            if fragment.first().map(|n| n.runtime_id.as_slice()) != Some(runtime_id) {
                warn!("Replacement subtree root does not carry runtime id {runtime_id:?}; keeping prior snapshot");
                return doc.clone();
            }
            Arc::new(splice(doc, idx, count, span_start, span_end, fragment, fragment_text))
        }
    }
}

/// Number of nodes in the subtree rooted at `id` (including `id`).
fn subtree_size(doc: &VBufferDocument, id: NodeId) -> usize {
    let mut total = 0;
    let mut stack = vec![id];
    while let Some(current) = stack.pop() {
        total += 1;
        stack.extend(doc.nodes[current].children.iter().copied());
    }
    total
}

/// Flat-text span covered by the subtree: from the root's range start to the
/// maximum range end over all subtree nodes.
fn subtree_span(doc: &VBufferDocument, idx: NodeId, count: usize) -> (usize, usize) {
    let start = doc.nodes[idx].range.0;
    let end = doc.nodes[idx..idx + count]
        .iter()
        .map(|n| n.range.1)
        .max()
        .unwrap_or(start)
        .max(start);
    (start, end)
}

/// Core splice: replaces arena slice `[idx, idx + count)` with `fragment`
/// and text span `[span_start, span_end)` with `fragment_text`.
fn splice(
    doc: &VBufferDocument,
    idx: NodeId,
    count: usize,
    span_start: usize,
    span_end: usize,
    fragment: Vec<VBufferNode>,
    fragment_text: String,
) -> VBufferDocument {
    let span_len = span_end - span_start;
    let fragment_count = fragment.len();
    let delta = fragment_text.len() as isize - span_len as isize;

    // Old-arena id → new-arena id for references held by kept nodes. The
    // splice root maps onto the fragment root; deeper subtree ids are never
    // referenced from outside the subtree.
    let remap = |old_id: NodeId| -> Option<NodeId> {
        if old_id < idx {
            Some(old_id)
        } else if old_id == idx {
            (fragment_count > 0).then_some(idx)
        } else if old_id < idx + count {
            None
        } else {
            Some(old_id - count + fragment_count)
        }
    };

    let mut flat_text = String::with_capacity(doc.flat_text.len() - span_len + fragment_text.len());
    flat_text.push_str(&doc.flat_text[..span_start]);
    flat_text.push_str(&fragment_text);
    flat_text.push_str(&doc.flat_text[span_end..]);

    let mut nodes: Vec<VBufferNode> = Vec::with_capacity(doc.nodes.len() - count + fragment_count);

    for old in &doc.nodes[..idx] {
        let mut node = old.clone();
        node.parent = node.parent.and_then(remap);
        node.children = node.children.iter().filter_map(|&c| remap(c)).collect();
        nodes.push(node);
    }

    let splice_parent = doc.nodes[idx].parent;
    for mut node in fragment {
        node.range = (node.range.0 + span_start, node.range.1 + span_start);
        node.parent = match node.parent {
            Some(local) => Some(idx + local),
            None => splice_parent,
        };
        node.children = node.children.iter().map(|&c| idx + c).collect();
        node.id = idx + node.id;
        nodes.push(node);
    }

    for old in &doc.nodes[idx + count..] {
        let mut node = old.clone();
        if node.range.0 >= span_end {
            node.range = (
                (node.range.0 as isize + delta) as usize,
                (node.range.1 as isize + delta) as usize,
            );
        }
        node.parent = node.parent.and_then(remap);
        node.children = node.children.iter().filter_map(|&c| remap(c)).collect();
        nodes.push(node);
    }

    let mut updated = VBufferDocument {
        flat_text,
        root: doc.root,
        nodes,
        ..Default::default()
    };
    updated.relink_order();
    updated.rebuild_indices();
    debug!(
        "Spliced {} nodes (was {}) at id {}, text {} -> {} chars",
        fragment_count,
        count,
        idx,
        span_len,
        updated.flat_text.len()
    );
    updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::a11y::StaticElement;
    use crate::vbuffer::build_document;

    /// Document: H1 "Welcome" followed by link "Click here", then footer
    /// text, all under one root.
    fn sample_doc() -> Arc<VBufferDocument> {
        let tree = StaticElement::new(vec![1], "Document", "")
            .with_child(
                StaticElement::new(vec![1, 1], "Text", "Welcome")
                    .with_role("heading")
                    .with_properties("level=1"),
            )
            .with_child(StaticElement::new(vec![1, 2], "Hyperlink", "Click here"))
            .with_child(StaticElement::new(vec![1, 3], "Text", "Footer"));
        Arc::new(build_document(&tree))
    }

    #[test]
    fn replacement_shifts_following_ranges_by_length_difference() {
        let doc = sample_doc();
        let link_before = doc.find_by_runtime_id(&[1, 2]).unwrap().range;

        let replacement = StaticElement::new(vec![1, 1], "Text", "Hi")
            .with_role("heading")
            .with_properties("level=1");
        let updated = apply_update(&doc, &[1, 1], Some(&replacement));

        // "Hi\n" is 3 chars, "Welcome\n" is 8: everything after moves by -5.
        let link_after = updated.find_by_runtime_id(&[1, 2]).unwrap();
        assert_eq!(link_after.range.0, link_before.0 - 5);
        assert_eq!(link_after.runtime_id, vec![1, 2]);

        assert!(!updated.flat_text.contains("Welcome"));
        assert!(updated.flat_text.contains("Hi"));
        assert_eq!(updated.flat_text, "Hi\nClick here\nFooter\n");
    }

    #[test]
    fn replacement_root_flags_are_reparsed() {
        let doc = sample_doc();
        let replacement = StaticElement::new(vec![1, 1], "Text", "Now a heading 3")
            .with_role("heading")
            .with_properties("level=3");
        let updated = apply_update(&doc, &[1, 1], Some(&replacement));

        let node = updated.find_by_runtime_id(&[1, 1]).unwrap();
        assert_eq!(node.heading_level, 3);
        assert_eq!(updated.headings, vec![node.id]);
    }

    #[test]
    fn deletion_removes_span_and_nodes() {
        let doc = sample_doc();
        let updated = apply_update::<StaticElement>(&doc, &[1, 2], None);

        assert_eq!(updated.flat_text, "Welcome\nFooter\n");
        assert!(updated.find_by_runtime_id(&[1, 2]).is_none());
        assert_eq!(updated.nodes.len(), doc.nodes.len() - 1);
        assert!(updated.links.is_empty());

        // Footer shifted left by the deleted span ("Click here\n" = 11).
        let footer = updated.find_by_runtime_id(&[1, 3]).unwrap();
        assert_eq!(footer.range, (8, 15));
    }

    #[test]
    fn subtree_replacement_rewires_parent_children() {
        // Replace the whole nav group with a smaller one.
        let tree = StaticElement::new(vec![1], "Document", "")
            .with_child(StaticElement::new(vec![1, 1], "Text", "Before"))
            .with_child(
                StaticElement::new(vec![1, 2], "Group", "")
                    .with_role("navigation")
                    .with_child(StaticElement::new(vec![1, 2, 1], "Hyperlink", "One"))
                    .with_child(StaticElement::new(vec![1, 2, 2], "Hyperlink", "Two")),
            )
            .with_child(StaticElement::new(vec![1, 3], "Text", "After"));
        let doc = Arc::new(build_document(&tree));

        let replacement = StaticElement::new(vec![1, 2], "Group", "")
            .with_role("navigation")
            .with_child(StaticElement::new(vec![1, 2, 9], "Hyperlink", "Only"));
        let updated = apply_update(&doc, &[1, 2], Some(&replacement));

        assert_eq!(updated.flat_text, "Before\nOnly\nAfter\n");
        let group = updated.find_by_runtime_id(&[1, 2]).unwrap();
        assert_eq!(group.children.len(), 1);
        let only = updated.find_by_runtime_id(&[1, 2, 9]).unwrap();
        assert_eq!(only.parent, Some(group.id));
        assert_eq!(updated.nodes[updated.root].children.len(), 3);

        // Old links are gone from the index, the new one is present.
        assert_eq!(updated.links.len(), 1);
        assert_eq!(updated.links[0], only.id);
    }

    #[test]
    fn linked_list_is_valid_after_splice() {
        let doc = sample_doc();
        let replacement = StaticElement::new(vec![1, 1], "Text", "Hi");
        let updated = apply_update(&doc, &[1, 1], Some(&replacement));

        let mut forward = Vec::new();
        let mut current = Some(updated.root);
        while let Some(id) = current {
            forward.push(id);
            current = updated.nodes[id].next;
        }
        assert_eq!(forward, (0..updated.nodes.len()).collect::<Vec<_>>());

        let mut backward = Vec::new();
        let mut current = Some(updated.nodes.len() - 1);
        while let Some(id) = current {
            backward.push(id);
            current = updated.nodes[id].prev;
        }
        backward.reverse();
        assert_eq!(forward, backward);
    }

    #[test]
    fn ranges_stay_within_bounds_after_update() {
        let doc = sample_doc();
        let replacement = StaticElement::new(vec![1, 1], "Text", "A considerably longer heading");
        let updated = apply_update(&doc, &[1, 1], Some(&replacement));

        for node in &updated.nodes {
            assert!(node.range.0 <= node.range.1);
            assert!(node.range.1 <= updated.flat_text.len());
        }
        for offset in 0..updated.flat_text.len() {
            assert!(updated.find_node_at_offset(offset).is_some(), "offset {offset}");
        }
    }

    #[test]
    fn unknown_runtime_id_returns_document_unchanged() {
        let doc = sample_doc();
        let updated = apply_update::<StaticElement>(&doc, &[9, 9, 9], None);
        assert!(Arc::ptr_eq(&doc, &updated));
    }

    #[test]
    fn mismatched_replacement_root_abandons_update() {
        let doc = sample_doc();
        let replacement = StaticElement::new(vec![5, 5], "Text", "Impostor");
        let updated = apply_update(&doc, &[1, 1], Some(&replacement));
        assert!(Arc::ptr_eq(&doc, &updated));
    }

    #[test]
    fn deleting_the_root_keeps_prior_snapshot() {
        let doc = sample_doc();
        let updated = apply_update::<StaticElement>(&doc, &[1], None);
        assert!(Arc::ptr_eq(&doc, &updated));
    }
}
