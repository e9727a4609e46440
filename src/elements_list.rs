//! Elements-list dialog model.
//!
//! A modal view over one document snapshot with four tabs (headings, links,
//! landmarks, form fields), a case-insensitive substring filter, and
//! keyboard-driven selection. The model is UI-toolkit free: the shell feeds
//! it key events and renders whatever it exposes.

use std::sync::Arc;

use crate::input::{vk, KeyEvent};
use crate::vbuffer::{NodeId, VBufferDocument, VBufferNode};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementsTab {
    Headings,
    Links,
    Landmarks,
    FormFields,
}

impl ElementsTab {
    pub const ALL: [ElementsTab; 4] = [
        ElementsTab::Headings,
        ElementsTab::Links,
        ElementsTab::Landmarks,
        ElementsTab::FormFields,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            ElementsTab::Headings => "Headings",
            ElementsTab::Links => "Links",
            ElementsTab::Landmarks => "Landmarks",
            ElementsTab::FormFields => "Form fields",
        }
    }

    fn next(&self) -> ElementsTab {
        match self {
            ElementsTab::Headings => ElementsTab::Links,
            ElementsTab::Links => ElementsTab::Landmarks,
            ElementsTab::Landmarks => ElementsTab::FormFields,
            ElementsTab::FormFields => ElementsTab::Headings,
        }
    }
}

/// What a key press did to the dialog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DialogOutcome {
    /// Dialog stays open.
    Open,
    /// User picked a node.
    Selected(NodeId),
    /// User dismissed the dialog.
    Cancelled,
}

pub struct ElementsList {
    doc: Arc<VBufferDocument>,
    tab: ElementsTab,
    filter: String,
    selection: usize,
}

impl ElementsList {
    pub fn new(doc: Arc<VBufferDocument>) -> Self {
        Self {
            doc,
            tab: ElementsTab::Headings,
            filter: String::new(),
            selection: 0,
        }
    }

    pub fn tab(&self) -> ElementsTab {
        self.tab
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn set_tab(&mut self, tab: ElementsTab) {
        self.tab = tab;
        self.selection = 0;
    }

    /// Entries of the active tab surviving the filter, as (node, display
    /// text) pairs in document order.
    pub fn entries(&self) -> Vec<(NodeId, String)> {
        let ids: &[NodeId] = match self.tab {
            ElementsTab::Headings => &self.doc.headings,
            ElementsTab::Links => &self.doc.links,
            ElementsTab::Landmarks => &self.doc.landmarks,
            ElementsTab::FormFields => &self.doc.form_fields,
        };
        let needle = self.filter.to_lowercase();
        ids.iter()
            .map(|&id| (id, display_text(&self.doc.nodes[id])))
            .filter(|(_, text)| needle.is_empty() || text.to_lowercase().contains(&needle))
            .collect()
    }

    /// Currently highlighted entry.
    pub fn selected(&self) -> Option<(NodeId, String)> {
        self.entries().into_iter().nth(self.selection)
    }

    /// Feeds one key-down into the dialog.
    pub fn handle_key(&mut self, event: KeyEvent) -> DialogOutcome {
        if !event.pressed {
            return DialogOutcome::Open;
        }
        match event.vk {
            vk::ESCAPE => return DialogOutcome::Cancelled,
            vk::RETURN => {
                if let Some((id, _)) = self.selected() {
                    return DialogOutcome::Selected(id);
                }
            }
            vk::TAB => self.set_tab(self.tab.next()),
            vk::UP => self.selection = self.selection.saturating_sub(1),
            vk::DOWN => {
                let count = self.entries().len();
                if count > 0 {
                    self.selection = (self.selection + 1).min(count - 1);
                }
            }
            vk::BACK => {
                self.filter.pop();
                self.selection = 0;
            }
            vk::KEY_A..=vk::KEY_Z => {
                let ch = (b'a' + (event.vk - vk::KEY_A) as u8) as char;
                self.filter.push(ch);
                self.selection = 0;
            }
            vk::KEY_0..=vk::KEY_9 => {
                let ch = (b'0' + (event.vk - vk::KEY_0) as u8) as char;
                self.filter.push(ch);
                self.selection = 0;
            }
            vk::SPACE => {
                self.filter.push(' ');
                self.selection = 0;
            }
            _ => {}
        }
        DialogOutcome::Open
    }

    /// Double-click on an entry row.
    pub fn activate_entry(&mut self, index: usize) -> DialogOutcome {
        self.selection = index;
        match self.selected() {
            Some((id, _)) => DialogOutcome::Selected(id),
            None => DialogOutcome::Open,
        }
    }
}

/// Row text: headings as "H{level}: {name}", landmarks by type, everything
/// else by name with a control-type fallback.
fn display_text(node: &VBufferNode) -> String {
    if node.is_heading() {
        return format!("H{}: {}", node.heading_level, node.name);
    }
    if !node.landmark.is_empty() {
        return if node.name.is_empty() {
            node.landmark.clone()
        } else {
            format!("{}: {}", node.landmark, node.name)
        };
    }
    if !node.name.is_empty() {
        node.name.clone()
    } else {
        format!("[{}]", node.control_type)
    }
}
