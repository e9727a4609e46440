//! Keymap: (modifiers, virtual key, mode) → navigation command.
//!
//! A built-in binding table covers the stock layout; a JSON keymap file, when
//! present, overlays it binding by binding. Invalid file entries are skipped
//! with a warning so one typo never takes the whole keymap down.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use tracing::{info, warn};

use super::{vk, Modifiers};
use crate::events::Mode;

/// The closed set of navigation commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NavigationCommand {
    NextHeading,
    PrevHeading,
    HeadingLevel1,
    HeadingLevel2,
    HeadingLevel3,
    HeadingLevel4,
    HeadingLevel5,
    HeadingLevel6,
    NextLink,
    PrevLink,
    NextLandmark,
    PrevLandmark,
    NextFormField,
    PrevFormField,
    NextTable,
    PrevTable,
    NextFocusable,
    PrevFocusable,
    NextLine,
    PrevLine,
    NextWord,
    PrevWord,
    NextChar,
    PrevChar,
    ActivateElement,
    ToggleMode,
    SayAll,
    StopSpeech,
    ElementsList,
    ReadCurrentLine,
    ReadCurrentWord,
}

impl NavigationCommand {
    pub const ALL: [NavigationCommand; 31] = [
        NavigationCommand::NextHeading,
        NavigationCommand::PrevHeading,
        NavigationCommand::HeadingLevel1,
        NavigationCommand::HeadingLevel2,
        NavigationCommand::HeadingLevel3,
        NavigationCommand::HeadingLevel4,
        NavigationCommand::HeadingLevel5,
        NavigationCommand::HeadingLevel6,
        NavigationCommand::NextLink,
        NavigationCommand::PrevLink,
        NavigationCommand::NextLandmark,
        NavigationCommand::PrevLandmark,
        NavigationCommand::NextFormField,
        NavigationCommand::PrevFormField,
        NavigationCommand::NextTable,
        NavigationCommand::PrevTable,
        NavigationCommand::NextFocusable,
        NavigationCommand::PrevFocusable,
        NavigationCommand::NextLine,
        NavigationCommand::PrevLine,
        NavigationCommand::NextWord,
        NavigationCommand::PrevWord,
        NavigationCommand::NextChar,
        NavigationCommand::PrevChar,
        NavigationCommand::ActivateElement,
        NavigationCommand::ToggleMode,
        NavigationCommand::SayAll,
        NavigationCommand::StopSpeech,
        NavigationCommand::ElementsList,
        NavigationCommand::ReadCurrentLine,
        NavigationCommand::ReadCurrentWord,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            NavigationCommand::NextHeading => "NextHeading",
            NavigationCommand::PrevHeading => "PrevHeading",
            NavigationCommand::HeadingLevel1 => "HeadingLevel1",
            NavigationCommand::HeadingLevel2 => "HeadingLevel2",
            NavigationCommand::HeadingLevel3 => "HeadingLevel3",
            NavigationCommand::HeadingLevel4 => "HeadingLevel4",
            NavigationCommand::HeadingLevel5 => "HeadingLevel5",
            NavigationCommand::HeadingLevel6 => "HeadingLevel6",
            NavigationCommand::NextLink => "NextLink",
            NavigationCommand::PrevLink => "PrevLink",
            NavigationCommand::NextLandmark => "NextLandmark",
            NavigationCommand::PrevLandmark => "PrevLandmark",
            NavigationCommand::NextFormField => "NextFormField",
            NavigationCommand::PrevFormField => "PrevFormField",
            NavigationCommand::NextTable => "NextTable",
            NavigationCommand::PrevTable => "PrevTable",
            NavigationCommand::NextFocusable => "NextFocusable",
            NavigationCommand::PrevFocusable => "PrevFocusable",
            NavigationCommand::NextLine => "NextLine",
            NavigationCommand::PrevLine => "PrevLine",
            NavigationCommand::NextWord => "NextWord",
            NavigationCommand::PrevWord => "PrevWord",
            NavigationCommand::NextChar => "NextChar",
            NavigationCommand::PrevChar => "PrevChar",
            NavigationCommand::ActivateElement => "ActivateElement",
            NavigationCommand::ToggleMode => "ToggleMode",
            NavigationCommand::SayAll => "SayAll",
            NavigationCommand::StopSpeech => "StopSpeech",
            NavigationCommand::ElementsList => "ElementsList",
            NavigationCommand::ReadCurrentLine => "ReadCurrentLine",
            NavigationCommand::ReadCurrentWord => "ReadCurrentWord",
        }
    }

    /// Heading level a `HeadingLevelN` command targets, if any.
    pub fn heading_level(&self) -> Option<u8> {
        match self {
            NavigationCommand::HeadingLevel1 => Some(1),
            NavigationCommand::HeadingLevel2 => Some(2),
            NavigationCommand::HeadingLevel3 => Some(3),
            NavigationCommand::HeadingLevel4 => Some(4),
            NavigationCommand::HeadingLevel5 => Some(5),
            NavigationCommand::HeadingLevel6 => Some(6),
            _ => None,
        }
    }
}

impl FromStr for NavigationCommand {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NavigationCommand::ALL
            .iter()
            .find(|c| c.name() == s)
            .copied()
            .ok_or(())
    }
}

/// Binding scope in the keymap file. `Any` expands into both real modes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum KeymapMode {
    Browse,
    Focus,
    Any,
}

#[derive(Debug, Deserialize)]
struct KeymapFile {
    bindings: Vec<BindingEntry>,
}

#[derive(Debug, Deserialize)]
struct BindingEntry {
    modifiers: String,
    #[serde(rename = "vkCode")]
    vk_code: u32,
    mode: KeymapMode,
    command: String,
}

/// The resolved lookup table.
pub struct Keymap {
    map: HashMap<(Modifiers, u32, Mode), NavigationCommand>,
}

impl Keymap {
    pub fn empty() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Inserts one binding, expanding `Any` into both modes.
    pub fn bind(
        &mut self,
        modifiers: Modifiers,
        vk_code: u32,
        mode: KeymapMode,
        command: NavigationCommand,
    ) {
        match mode {
            KeymapMode::Browse => {
                self.map.insert((modifiers, vk_code, Mode::Browse), command);
            }
            KeymapMode::Focus => {
                self.map.insert((modifiers, vk_code, Mode::Focus), command);
            }
            KeymapMode::Any => {
                self.map.insert((modifiers, vk_code, Mode::Browse), command);
                self.map.insert((modifiers, vk_code, Mode::Focus), command);
            }
        }
    }

    /// Looks up the exact (modifiers, key, mode) triple.
    pub fn try_resolve(
        &self,
        modifiers: Modifiers,
        vk_code: u32,
        mode: Mode,
    ) -> Option<NavigationCommand> {
        self.map.get(&(modifiers, vk_code, mode)).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// The stock layout: browse-mode letter navigation with shifted reverse
    /// variants, arrow reading keys, and reader-modifier chords.
    pub fn with_defaults() -> Self {
        use KeymapMode::{Any, Browse};
        use NavigationCommand as Cmd;

        let none = Modifiers::empty();
        let shift = Modifiers::SHIFT;
        let ctrl = Modifiers::CTRL;
        let reader = Modifiers::READER;

        let mut keymap = Self::empty();

        keymap.bind(none, vk::KEY_H, Browse, Cmd::NextHeading);
        keymap.bind(shift, vk::KEY_H, Browse, Cmd::PrevHeading);
        keymap.bind(none, vk::KEY_1, Browse, Cmd::HeadingLevel1);
        keymap.bind(none, vk::KEY_2, Browse, Cmd::HeadingLevel2);
        keymap.bind(none, vk::KEY_3, Browse, Cmd::HeadingLevel3);
        keymap.bind(none, vk::KEY_4, Browse, Cmd::HeadingLevel4);
        keymap.bind(none, vk::KEY_5, Browse, Cmd::HeadingLevel5);
        keymap.bind(none, vk::KEY_6, Browse, Cmd::HeadingLevel6);
        keymap.bind(none, vk::KEY_K, Browse, Cmd::NextLink);
        keymap.bind(shift, vk::KEY_K, Browse, Cmd::PrevLink);
        keymap.bind(none, vk::KEY_D, Browse, Cmd::NextLandmark);
        keymap.bind(shift, vk::KEY_D, Browse, Cmd::PrevLandmark);
        keymap.bind(none, vk::KEY_F, Browse, Cmd::NextFormField);
        keymap.bind(shift, vk::KEY_F, Browse, Cmd::PrevFormField);
        keymap.bind(none, vk::KEY_T, Browse, Cmd::NextTable);
        keymap.bind(shift, vk::KEY_T, Browse, Cmd::PrevTable);
        keymap.bind(none, vk::TAB, Browse, Cmd::NextFocusable);
        keymap.bind(shift, vk::TAB, Browse, Cmd::PrevFocusable);

        keymap.bind(none, vk::DOWN, Browse, Cmd::NextLine);
        keymap.bind(none, vk::UP, Browse, Cmd::PrevLine);
        keymap.bind(ctrl, vk::RIGHT, Browse, Cmd::NextWord);
        keymap.bind(ctrl, vk::LEFT, Browse, Cmd::PrevWord);
        keymap.bind(none, vk::RIGHT, Browse, Cmd::NextChar);
        keymap.bind(none, vk::LEFT, Browse, Cmd::PrevChar);
        keymap.bind(none, vk::RETURN, Browse, Cmd::ActivateElement);

        keymap.bind(reader, vk::SPACE, Any, Cmd::ToggleMode);
        keymap.bind(reader, vk::DOWN, Any, Cmd::SayAll);
        keymap.bind(reader, vk::UP, Any, Cmd::ReadCurrentLine);
        keymap.bind(reader, vk::LEFT, Any, Cmd::ReadCurrentWord);
        keymap.bind(reader, vk::F7, Any, Cmd::ElementsList);
        // The hook reports left/right control, not the generic code.
        keymap.bind(ctrl, vk::LCONTROL, Any, Cmd::StopSpeech);
        keymap.bind(ctrl, vk::RCONTROL, Any, Cmd::StopSpeech);

        keymap
    }

    /// Loads the stock layout and overlays `path` on top of it, skipping
    /// entries that fail to parse.
    pub fn load(path: &Path) -> Self {
        let mut keymap = Self::with_defaults();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(_) => {
                info!("No keymap file at {}, using defaults", path.display());
                return keymap;
            }
        };

        let file: KeymapFile = match serde_json::from_str(&text) {
            Ok(file) => file,
            Err(e) => {
                warn!("Keymap file {} is malformed ({e}), using defaults", path.display());
                return keymap;
            }
        };

        let mut loaded = 0usize;
        for entry in file.bindings {
            let Some(modifiers) = parse_modifiers(&entry.modifiers) else {
                warn!("Skipping binding with bad modifiers {:?}", entry.modifiers);
                continue;
            };
            let Ok(command) = NavigationCommand::from_str(&entry.command) else {
                warn!("Skipping binding with unknown command {:?}", entry.command);
                continue;
            };
            keymap.bind(modifiers, entry.vk_code, entry.mode, command);
            loaded += 1;
        }
        info!("Loaded {loaded} keymap bindings from {}", path.display());
        keymap
    }
}

impl Default for Keymap {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Parses a pipe-separated modifier list: `None`, `Shift`, `Ctrl`, `Alt`,
/// `Insert` (the reader modifier). Returns `None` on any unknown token.
pub fn parse_modifiers(text: &str) -> Option<Modifiers> {
    let mut modifiers = Modifiers::empty();
    for token in text.split('|').map(str::trim).filter(|t| !t.is_empty()) {
        match token {
            "None" => {}
            "Shift" => modifiers |= Modifiers::SHIFT,
            "Ctrl" => modifiers |= Modifiers::CTRL,
            "Alt" => modifiers |= Modifiers::ALT,
            "Insert" => modifiers |= Modifiers::READER,
            _ => return None,
        }
    }
    Some(modifiers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve_heading_navigation() {
        let keymap = Keymap::with_defaults();
        assert_eq!(
            keymap.try_resolve(Modifiers::empty(), vk::KEY_H, Mode::Browse),
            Some(NavigationCommand::NextHeading)
        );
        assert_eq!(
            keymap.try_resolve(Modifiers::SHIFT, vk::KEY_H, Mode::Browse),
            Some(NavigationCommand::PrevHeading)
        );
        // Letter navigation is browse-only.
        assert_eq!(
            keymap.try_resolve(Modifiers::empty(), vk::KEY_H, Mode::Focus),
            None
        );
    }

    #[test]
    fn any_mode_expands_to_both() {
        let mut keymap = Keymap::empty();
        keymap.bind(
            Modifiers::READER,
            vk::SPACE,
            KeymapMode::Any,
            NavigationCommand::ToggleMode,
        );
        for mode in [Mode::Browse, Mode::Focus] {
            assert_eq!(
                keymap.try_resolve(Modifiers::READER, vk::SPACE, mode),
                Some(NavigationCommand::ToggleMode)
            );
        }
    }

    #[test]
    fn modifier_parsing_accepts_piped_lists() {
        assert_eq!(parse_modifiers("None"), Some(Modifiers::empty()));
        assert_eq!(
            parse_modifiers("Shift|Ctrl"),
            Some(Modifiers::SHIFT | Modifiers::CTRL)
        );
        assert_eq!(parse_modifiers("Insert"), Some(Modifiers::READER));
        assert_eq!(parse_modifiers("Hyper"), None);
    }

    #[test]
    fn command_names_round_trip() {
        for command in NavigationCommand::ALL {
            assert_eq!(NavigationCommand::from_str(command.name()), Ok(command));
        }
    }

    #[test]
    fn file_overlay_replaces_and_skips_bad_entries() {
        let dir = std::env::temp_dir().join("ariavox-keymap-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("keymap.json");
        std::fs::write(
            &path,
            r#"{
                "bindings": [
                    {"modifiers": "Ctrl", "vkCode": 72, "mode": "Browse", "command": "NextLink"},
                    {"modifiers": "Warp", "vkCode": 73, "mode": "Browse", "command": "NextLink"},
                    {"modifiers": "None", "vkCode": 74, "mode": "Any", "command": "DoBarrelRoll"}
                ]
            }"#,
        )
        .unwrap();

        let keymap = Keymap::load(&path);
        // The good entry landed.
        assert_eq!(
            keymap.try_resolve(Modifiers::CTRL, 72, Mode::Browse),
            Some(NavigationCommand::NextLink)
        );
        // Bad entries were skipped without disturbing the defaults.
        assert_eq!(keymap.try_resolve(Modifiers::empty(), 73, Mode::Browse), None);
        assert_eq!(
            keymap.try_resolve(Modifiers::empty(), vk::KEY_K, Mode::Browse),
            Some(NavigationCommand::NextLink)
        );
    }

    #[test]
    fn loaded_bindings_resolve_back_to_their_commands() {
        // Round-trip property over a representative binding set.
        let bindings = [
            (Modifiers::empty(), vk::KEY_K, KeymapMode::Browse, NavigationCommand::NextLink),
            (Modifiers::SHIFT, vk::KEY_K, KeymapMode::Browse, NavigationCommand::PrevLink),
            (Modifiers::READER, vk::F7, KeymapMode::Any, NavigationCommand::ElementsList),
            (Modifiers::CTRL | Modifiers::ALT, vk::KEY_T, KeymapMode::Focus, NavigationCommand::NextTable),
        ];
        let mut keymap = Keymap::empty();
        for (modifiers, key, mode, command) in bindings {
            keymap.bind(modifiers, key, mode, command);
        }
        for (modifiers, key, mode, command) in bindings {
            let modes: &[Mode] = match mode {
                KeymapMode::Browse => &[Mode::Browse],
                KeymapMode::Focus => &[Mode::Focus],
                KeymapMode::Any => &[Mode::Browse, Mode::Focus],
            };
            for &m in modes {
                assert_eq!(keymap.try_resolve(modifiers, key, m), Some(command));
            }
        }
    }
}
