/*!
 * Accessibility Module
 *
 * The abstract element surface the virtual buffer is built from, the
 * translation maps from platform identifiers to the short tags used
 * everywhere else, the single-threaded host all platform calls marshal
 * through, and the live-region change detector.
 */

pub mod aria;
pub mod events;
pub mod host;
pub mod live_region;

#[cfg(target_os = "windows")]
pub mod uia;

pub use host::AccessibilityHost;
pub use live_region::LiveRegionMonitor;

/// Abstract accessibility element, as exposed to the virtual-buffer builder
/// and to tests. Implementations are value-like: every accessor returns
/// owned data captured from the platform's cache.
pub trait AccessibleElement {
    fn runtime_id(&self) -> Vec<i32>;
    fn name(&self) -> String;
    fn control_type(&self) -> String;
    fn aria_role(&self) -> String;
    fn aria_properties(&self) -> String;
    fn is_focusable(&self) -> bool;
    fn description(&self) -> String {
        String::new()
    }
    fn children(&self) -> Vec<Self>
    where
        Self: Sized;
}

/// Translates a platform control-type id (the 50000-range integers) into the
/// short tag used throughout the pipeline.
pub fn control_type_name(id: i32) -> &'static str {
    match id {
        50000 => "Button",
        50001 => "Calendar",
        50002 => "CheckBox",
        50003 => "ComboBox",
        50004 => "Edit",
        50005 => "Hyperlink",
        50006 => "Image",
        50007 => "ListItem",
        50008 => "List",
        50009 => "Menu",
        50010 => "MenuBar",
        50011 => "MenuItem",
        50012 => "ProgressBar",
        50013 => "RadioButton",
        50014 => "ScrollBar",
        50015 => "Slider",
        50016 => "Spinner",
        50017 => "StatusBar",
        50018 => "Tab",
        50019 => "TabItem",
        50020 => "Text",
        50021 => "ToolBar",
        50022 => "ToolTip",
        50023 => "Tree",
        50024 => "TreeItem",
        50025 => "Custom",
        50026 => "Group",
        50027 => "Thumb",
        50028 => "DataGrid",
        50029 => "DataItem",
        50030 => "Document",
        50031 => "SplitButton",
        50032 => "Window",
        50033 => "Pane",
        50034 => "Header",
        50035 => "HeaderItem",
        50036 => "Table",
        50037 => "TitleBar",
        50038 => "Separator",
        50039 => "SemanticZoom",
        50040 => "AppBar",
        _ => "Unknown",
    }
}

/// Control types whose instances count as form fields.
pub const FORM_FIELD_TYPES: [&str; 8] = [
    "Edit",
    "ComboBox",
    "CheckBox",
    "RadioButton",
    "Spinner",
    "Slider",
    "List",
    "ListItem",
];

pub fn is_form_field_type(control_type: &str) -> bool {
    FORM_FIELD_TYPES.contains(&control_type)
}

/// In-memory element used by tests and by the incremental updater's fixture
/// paths. Mirrors exactly what the builder reads.
#[derive(Clone, Debug, Default)]
pub struct StaticElement {
    pub runtime_id: Vec<i32>,
    pub name: String,
    pub control_type: String,
    pub aria_role: String,
    pub aria_properties: String,
    pub focusable: bool,
    pub description: String,
    pub children: Vec<StaticElement>,
}

impl StaticElement {
    pub fn new(runtime_id: Vec<i32>, control_type: &str, name: &str) -> Self {
        Self {
            runtime_id,
            name: name.to_string(),
            control_type: control_type.to_string(),
            ..Default::default()
        }
    }

    pub fn with_role(mut self, role: &str) -> Self {
        self.aria_role = role.to_string();
        self
    }

    pub fn with_properties(mut self, properties: &str) -> Self {
        self.aria_properties = properties.to_string();
        self
    }

    pub fn focusable(mut self) -> Self {
        self.focusable = true;
        self
    }

    pub fn with_child(mut self, child: StaticElement) -> Self {
        self.children.push(child);
        self
    }
}

impl AccessibleElement for StaticElement {
    fn runtime_id(&self) -> Vec<i32> {
        self.runtime_id.clone()
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn control_type(&self) -> String {
        self.control_type.clone()
    }

    fn aria_role(&self) -> String {
        self.aria_role.clone()
    }

    fn aria_properties(&self) -> String {
        self.aria_properties.clone()
    }

    fn is_focusable(&self) -> bool {
        self.focusable
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn children(&self) -> Vec<Self> {
        self.children.clone()
    }
}
