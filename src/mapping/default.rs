//! The built-in mapping structure used on first run and whenever the
//! stored root file is unreadable or carries the wrong schema version.

use std::collections::HashMap;

use crate::mapping::schema::{
    Action, ActionReference, ButtonMapping, Key, KeyBindings, Mode, MappingStructure,
    DEFAULT_PROFILE, MAPPING_VERSION,
};

/// Id of the source that contributes the built-in keys and actions.
pub const SERVER_SOURCE: &str = "server";

fn server_key(id: &str, modes: Vec<Mode>, description: &str) -> Key {
    Key {
        id: id.to_string(),
        source: SERVER_SOURCE.to_string(),
        version: MAPPING_VERSION.to_string(),
        enabled: true,
        modes,
        description: Some(description.to_string()),
    }
}

fn server_action(id: &str, name: &str, description: &str) -> Action {
    Action {
        id: id.to_string(),
        source: SERVER_SOURCE.to_string(),
        version: MAPPING_VERSION.to_string(),
        enabled: true,
        value: None,
        icon: Some(id.to_string()),
        name: Some(name.to_string()),
        description: Some(description.to_string()),
    }
}

fn bind(key: &str, entries: &[(Mode, &str)]) -> (String, KeyBindings) {
    let bindings = entries
        .iter()
        .map(|&(mode, action_id)| {
            (
                mode,
                ActionReference {
                    id: action_id.to_string(),
                    source: SERVER_SOURCE.to_string(),
                    value: None,
                    enabled: true,
                },
            )
        })
        .collect();
    (key.to_string(), bindings)
}

/// The default profile: every built-in key bound to a built-in action.
pub fn default_profile() -> ButtonMapping {
    ButtonMapping {
        id: "default_mapping".to_string(),
        name: DEFAULT_PROFILE.to_string(),
        version: MAPPING_VERSION.to_string(),
        version_code: 1,
        description: Some("Built-in default bindings".to_string()),
        trigger_app: None,
        mapping: HashMap::from([
            bind("Digit1", &[(Mode::Press, "pref_1"), (Mode::LongPress, "set_pref_1")]),
            bind("Digit2", &[(Mode::Press, "pref_2"), (Mode::LongPress, "set_pref_2")]),
            bind("Digit3", &[(Mode::Press, "pref_3"), (Mode::LongPress, "set_pref_3")]),
            bind("Digit4", &[(Mode::Press, "pref_4"), (Mode::LongPress, "set_pref_4")]),
            bind("KeyM", &[(Mode::Press, "open_app_list")]),
            bind("Enter", &[(Mode::Press, "play_pause"), (Mode::LongPress, "skip_next")]),
            bind(
                "Scroll",
                &[
                    (Mode::ScrollUp, "volume_up"),
                    (Mode::ScrollDown, "volume_down"),
                ],
            ),
            bind(
                "Swipe",
                &[
                    (Mode::SwipeLeft, "show_previous_view"),
                    (Mode::SwipeRight, "show_next_view"),
                ],
            ),
        ]),
    }
}

/// The complete built-in structure: server keys, server actions, and the
/// default profile, with no explicit selection (meaning default).
pub fn default_structure() -> MappingStructure {
    MappingStructure {
        version: MAPPING_VERSION.to_string(),
        keys: vec![
            server_key(
                "Digit1",
                vec![Mode::Press, Mode::LongPress],
                "Preference slot 1",
            ),
            server_key(
                "Digit2",
                vec![Mode::Press, Mode::LongPress],
                "Preference slot 2",
            ),
            server_key(
                "Digit3",
                vec![Mode::Press, Mode::LongPress],
                "Preference slot 3",
            ),
            server_key(
                "Digit4",
                vec![Mode::Press, Mode::LongPress],
                "Preference slot 4",
            ),
            server_key("KeyM", vec![Mode::Press], "App list toggle"),
            server_key(
                "Enter",
                vec![Mode::Press, Mode::LongPress, Mode::Release],
                "Select / media control",
            ),
            server_key(
                "Scroll",
                vec![Mode::ScrollUp, Mode::ScrollDown],
                "Volume wheel",
            ),
            server_key(
                "Swipe",
                vec![Mode::SwipeLeft, Mode::SwipeRight],
                "View navigation",
            ),
        ],
        actions: vec![
            server_action("pref_1", "Preference 1", "Open the app in preference slot 1"),
            server_action("pref_2", "Preference 2", "Open the app in preference slot 2"),
            server_action("pref_3", "Preference 3", "Open the app in preference slot 3"),
            server_action("pref_4", "Preference 4", "Open the app in preference slot 4"),
            server_action("set_pref_1", "Set Preference 1", "Bind the current app to slot 1"),
            server_action("set_pref_2", "Set Preference 2", "Bind the current app to slot 2"),
            server_action("set_pref_3", "Set Preference 3", "Bind the current app to slot 3"),
            server_action("set_pref_4", "Set Preference 4", "Bind the current app to slot 4"),
            server_action("open_app_list", "App List", "Toggle the app list overlay"),
            server_action("play_pause", "Play / Pause", "Toggle media playback"),
            server_action("skip_next", "Skip", "Skip to the next track"),
            server_action("volume_up", "Volume Up", "Raise playback volume"),
            server_action("volume_down", "Volume Down", "Lower playback volume"),
            server_action("show_previous_view", "Previous View", "Navigate to the previous view"),
            server_action("show_next_view", "Next View", "Navigate to the next view"),
        ],
        profiles: HashMap::from([(DEFAULT_PROFILE.to_string(), default_profile())]),
        selected_profile: None,
    }
}
