//! Announcement builder: node → comma-joined speech text.
//!
//! Field order is fixed; each field is gated by the verbosity profile. Blank
//! fields are skipped, and a node announced as "heading level N" never also
//! announces a "heading" control type.

use crate::events::ElementSnapshot;
use crate::settings::VerbosityLevel;
use crate::vbuffer::{NodeId, VBufferDocument, VBufferNode};

/// Which announcement fields are emitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VerbosityProfile {
    pub heading_level: bool,
    pub landmark_type: bool,
    pub control_type: bool,
    pub visited: bool,
    pub required: bool,
    pub expanded: bool,
    pub position_info: bool,
    pub description: bool,
}

impl VerbosityProfile {
    pub fn beginner() -> Self {
        Self {
            heading_level: true,
            landmark_type: true,
            control_type: true,
            visited: true,
            required: true,
            expanded: true,
            position_info: true,
            description: true,
        }
    }

    pub fn intermediate() -> Self {
        Self {
            heading_level: true,
            landmark_type: false,
            control_type: true,
            visited: true,
            required: true,
            expanded: true,
            position_info: false,
            description: false,
        }
    }

    pub fn advanced() -> Self {
        Self {
            heading_level: false,
            landmark_type: false,
            control_type: false,
            visited: false,
            required: false,
            expanded: true,
            position_info: false,
            description: false,
        }
    }

    pub fn for_level(level: VerbosityLevel) -> Self {
        match level {
            VerbosityLevel::Beginner => Self::beginner(),
            VerbosityLevel::Intermediate => Self::intermediate(),
            VerbosityLevel::Advanced => Self::advanced(),
        }
    }

    /// Copy of this profile that never announces visited state; used when
    /// the user turns visited-link announcements off.
    pub fn without_visited(mut self) -> Self {
        self.visited = false;
        self
    }
}

/// Control types announced only by position in a containing widget.
const POSITIONAL_TYPES: [&str; 5] = ["ListItem", "RadioButton", "TreeItem", "TabItem", "MenuItem"];

/// Renders a buffer node for speech.
pub fn build_announcement(
    doc: &VBufferDocument,
    id: NodeId,
    profile: &VerbosityProfile,
) -> String {
    let Some(node) = doc.node(id) else {
        return String::new();
    };

    let mut parts: Vec<String> = Vec::new();
    push_common_parts(&mut parts, node_fields(node), profile);

    if profile.position_info
        && POSITIONAL_TYPES.contains(&node.control_type.as_str())
    {
        if let Some((position, total)) = doc.position_in_parent(id) {
            if total > 1 {
                parts.push(format!("{position} of {total}"));
            }
        }
    }

    if profile.description && !node.description.is_empty() {
        parts.push(node.description.clone());
    }

    parts.join(", ")
}

/// Renders a focus snapshot for speech; snapshots carry no position or
/// description data, so only the common fields apply.
pub fn describe_snapshot(snapshot: &ElementSnapshot, profile: &VerbosityProfile) -> String {
    let mut parts: Vec<String> = Vec::new();
    push_common_parts(
        &mut parts,
        Fields {
            name: &snapshot.name,
            control_type: &snapshot.control_type,
            heading_level: snapshot.heading_level,
            landmark: &snapshot.landmark,
            is_link: snapshot.is_link,
            is_visited: false,
            is_required: false,
            is_expandable: false,
            is_expanded: false,
        },
        profile,
    );
    parts.join(", ")
}

struct Fields<'a> {
    name: &'a str,
    control_type: &'a str,
    heading_level: u8,
    landmark: &'a str,
    is_link: bool,
    is_visited: bool,
    is_required: bool,
    is_expandable: bool,
    is_expanded: bool,
}

fn node_fields(node: &VBufferNode) -> Fields<'_> {
    Fields {
        name: &node.name,
        control_type: &node.control_type,
        heading_level: node.heading_level,
        landmark: &node.landmark,
        is_link: node.is_link,
        is_visited: node.is_visited,
        is_required: node.is_required,
        is_expandable: node.is_expandable,
        is_expanded: node.is_expanded,
    }
}

/// Emits the fixed-order fields shared by nodes and snapshots.
fn push_common_parts(parts: &mut Vec<String>, fields: Fields<'_>, profile: &VerbosityProfile) {
    let mut heading_emitted = false;

    if profile.heading_level && (1..=6).contains(&fields.heading_level) {
        parts.push(format!("heading level {}", fields.heading_level));
        heading_emitted = true;
    }

    if profile.landmark_type && !fields.landmark.is_empty() {
        parts.push(format!("{} landmark", fields.landmark.to_lowercase()));
    }

    if !fields.name.is_empty() {
        parts.push(fields.name.to_string());
    }

    if profile.control_type {
        let spoken = if fields.is_link {
            "hyperlink".to_string()
        } else {
            speakable_control_type(fields.control_type)
        };
        let redundant_heading = heading_emitted && spoken == "heading";
        if !spoken.is_empty() && !redundant_heading {
            parts.push(spoken);
        }
    }

    if profile.visited && fields.is_visited {
        parts.push("visited".to_string());
    }

    if profile.required && fields.is_required {
        parts.push("required".to_string());
    }

    if profile.expanded && fields.is_expandable {
        parts.push(if fields.is_expanded { "expanded" } else { "collapsed" }.to_string());
    }
}

/// Spoken form of a control-type tag: CamelCase split and lowercased.
/// Plain text and unknown types are noise, not information.
fn speakable_control_type(control_type: &str) -> String {
    if control_type.is_empty() || control_type == "Text" || control_type == "Unknown" {
        return String::new();
    }
    let mut spoken = String::with_capacity(control_type.len() + 2);
    for (i, c) in control_type.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                spoken.push(' ');
            }
            spoken.extend(c.to_lowercase());
        } else {
            spoken.push(c);
        }
    }
    spoken
}
