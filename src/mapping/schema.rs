//! Data types for the versioned key→mode→action mapping configuration.
//!
//! These types map to both the in-memory aggregate held by the routing
//! engine and the on-disk layout: one root `mappings.json` plus one JSON
//! file per profile, named by the profile id.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Schema version the engine expects. A stored root file carrying any
/// other version is treated as corrupt and replaced with the default.
pub const MAPPING_VERSION: &str = "1.0.0";

/// Name of the profile that always exists and can never be removed.
pub const DEFAULT_PROFILE: &str = "default";

/// An interaction flavor a key may support and a binding may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Press,
    LongPress,
    Release,
    ScrollUp,
    ScrollDown,
    SwipeLeft,
    SwipeRight,
}

impl Mode {
    /// Human-readable name, matching the serialized form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Press => "press",
            Self::LongPress => "long_press",
            Self::Release => "release",
            Self::ScrollUp => "scroll_up",
            Self::ScrollDown => "scroll_down",
            Self::SwipeLeft => "swipe_left",
            Self::SwipeRight => "swipe_right",
        }
    }
}

/// A physical or virtual input control contributed by a source.
///
/// Keys are created when a plugin registers them, disabled (not deleted)
/// when their source is removed, and removed only explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Key {
    /// Unique id within a source (e.g. "Digit1", "Scroll").
    pub id: String,
    /// Owning plugin id.
    pub source: String,
    /// Version of the contributing source.
    pub version: String,
    /// Whether the key currently participates in routing.
    pub enabled: bool,
    /// Interaction flavors this key supports.
    pub modes: Vec<Mode>,
    /// Optional human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A capability contributed by a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Unique id within a source.
    pub id: String,
    /// Owning plugin id.
    pub source: String,
    /// Version of the contributing source. Defaults to "0.0.0" when absent.
    #[serde(default = "default_version")]
    pub version: String,
    /// Whether the action may be dispatched. Defaults to true when absent.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Free-form payload forwarded to the plugin on dispatch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// Icon identifier for UI surfaces.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Optional human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

pub(crate) fn default_version() -> String {
    "0.0.0".to_string()
}

pub(crate) const fn default_enabled() -> bool {
    true
}

/// A lightweight pointer embedded inside a binding, decoupled from the
/// full [`Action`] so profile data does not duplicate action metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionReference {
    pub id: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl From<&Action> for ActionReference {
    /// Constructed from an Action by copying exactly these fields.
    fn from(action: &Action) -> Self {
        Self {
            id: action.id.clone(),
            source: action.source.clone(),
            value: action.value.clone(),
            enabled: action.enabled,
        }
    }
}

/// Either a full action or a reference, for dispatch entry points that
/// accept both. Matched exhaustively, never probed field-by-field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionPayload {
    Action(Action),
    Reference(ActionReference),
}

impl ActionPayload {
    /// Collapse to the reference form used on the wire.
    pub fn into_reference(self) -> ActionReference {
        match self {
            Self::Action(action) => ActionReference::from(&action),
            Self::Reference(reference) => reference,
        }
    }
}

/// Bindings for one key: a map from mode to the bound action reference.
pub type KeyBindings = HashMap<Mode, ActionReference>;

/// A named, switchable set of key→mode→action bindings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonMapping {
    /// Stable id, used as the per-profile file name.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Profile format version.
    pub version: String,
    /// Monotonic counter for migration ordering.
    pub version_code: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// App id that auto-selects this profile, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_app: Option<String>,
    /// Key id → mode → action reference.
    #[serde(default)]
    pub mapping: HashMap<String, KeyBindings>,
}

impl ButtonMapping {
    /// Clone this profile under a new name with a deep copy of its
    /// mapping and a derived id of the form `{base_id}_{name}`.
    pub fn clone_as(&self, name: &str) -> Self {
        Self {
            id: format!("{}_{name}", self.id),
            name: name.to_string(),
            version: self.version.clone(),
            version_code: self.version_code,
            description: self.description.clone(),
            trigger_app: self.trigger_app.clone(),
            mapping: self.mapping.clone(),
        }
    }
}

/// A partial profile update, deep-merged into an existing profile.
///
/// `mapping` entries are merged per key and per mode; fields left `None`
/// keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub version: Option<String>,
    pub version_code: Option<u32>,
    pub description: Option<String>,
    pub trigger_app: Option<String>,
    pub mapping: Option<HashMap<String, KeyBindings>>,
}

impl ProfilePatch {
    /// Deep-merge this patch into `profile`.
    pub fn apply(self, profile: &mut ButtonMapping) {
        if let Some(name) = self.name {
            profile.name = name;
        }
        if let Some(version) = self.version {
            profile.version = version;
        }
        if let Some(version_code) = self.version_code {
            profile.version_code = version_code;
        }
        if let Some(description) = self.description {
            profile.description = Some(description);
        }
        if let Some(trigger_app) = self.trigger_app {
            profile.trigger_app = Some(trigger_app);
        }
        if let Some(mapping) = self.mapping {
            for (key, modes) in mapping {
                profile.mapping.entry(key).or_default().extend(modes);
            }
        }
    }
}

/// The root aggregate owned exclusively by the routing engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingStructure {
    /// Schema version; must equal [`MAPPING_VERSION`] or the whole
    /// structure is considered corrupt.
    pub version: String,
    pub keys: Vec<Key>,
    pub actions: Vec<Action>,
    /// Profile name → full profile.
    pub profiles: HashMap<String, ButtonMapping>,
    /// Unset means the `default` profile is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_profile: Option<String>,
}

/// The root file as persisted: profiles are referenced by id instead of
/// being embedded, each living in its own `<id>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingFileStructure {
    pub version: String,
    pub keys: Vec<Key>,
    pub actions: Vec<Action>,
    /// Profile name → profile id (file stem).
    pub profiles: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_profile: Option<String>,
}

impl From<&MappingStructure> for MappingFileStructure {
    fn from(structure: &MappingStructure) -> Self {
        Self {
            version: structure.version.clone(),
            keys: structure.keys.clone(),
            actions: structure.actions.clone(),
            profiles: structure
                .profiles
                .iter()
                .map(|(name, profile)| (name.clone(), profile.id.clone()))
                .collect(),
            selected_profile: structure.selected_profile.clone(),
        }
    }
}
