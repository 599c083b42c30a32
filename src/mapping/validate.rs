//! Validation and sanitization for mapping data.
//!
//! Keys are validated strictly: a malformed key is rejected. Actions and
//! action references are sanitized permissively: missing optional fields
//! are filled with defaults and a warning is logged, because plugin
//! manifests in the wild frequently omit them. The defaulting is
//! deliberate and observable in the logs rather than silent.

use tracing::warn;

use crate::error::{BridgeError, Result};
use crate::mapping::schema::{
    Action, ActionReference, ButtonMapping, Key, MappingStructure, DEFAULT_PROFILE,
    MAPPING_VERSION,
};

/// Strictly validate a key. All of id, source, version, and at least one
/// mode are required.
pub fn validate_key(key: &Key) -> Result<()> {
    if key.id.is_empty() {
        return Err(BridgeError::Validation("key is missing an id".to_string()));
    }
    if key.source.is_empty() {
        return Err(BridgeError::Validation(format!(
            "key '{}' is missing a source",
            key.id
        )));
    }
    if key.version.is_empty() {
        return Err(BridgeError::Validation(format!(
            "key '{}' is missing a version",
            key.id
        )));
    }
    if key.modes.is_empty() {
        return Err(BridgeError::Validation(format!(
            "key '{}' supports no modes",
            key.id
        )));
    }
    Ok(())
}

/// Permissively sanitize an action in place. Only id and source are
/// mandatory; version defaults to "0.0.0" and enabled to true, each with
/// a logged warning.
pub fn sanitize_action(action: &mut Action) -> Result<()> {
    if action.id.is_empty() {
        return Err(BridgeError::Validation(
            "action is missing an id".to_string(),
        ));
    }
    if action.source.is_empty() {
        return Err(BridgeError::Validation(format!(
            "action '{}' is missing a source",
            action.id
        )));
    }
    if action.version.is_empty() {
        warn!(action = %action.id, "action has no version, defaulting to 0.0.0");
        action.version = "0.0.0".to_string();
    }
    Ok(())
}

/// Permissively sanitize an action reference. Only the id is mandatory.
pub fn sanitize_reference(reference: &mut ActionReference, fallback_source: &str) -> Result<()> {
    if reference.id.is_empty() {
        return Err(BridgeError::Validation(
            "action reference is missing an id".to_string(),
        ));
    }
    if reference.source.is_empty() {
        warn!(
            action = %reference.id,
            source = %fallback_source,
            "action reference has no source, inheriting"
        );
        reference.source = fallback_source.to_string();
    }
    Ok(())
}

/// Validate a profile loaded from disk: id and name must be present, and
/// every embedded reference must at least carry an id.
pub fn validate_profile(profile: &ButtonMapping) -> Result<()> {
    if profile.id.is_empty() {
        return Err(BridgeError::Validation(
            "profile is missing an id".to_string(),
        ));
    }
    if profile.name.is_empty() {
        return Err(BridgeError::Validation(format!(
            "profile '{}' is missing a name",
            profile.id
        )));
    }
    for (key, bindings) in &profile.mapping {
        for (mode, reference) in bindings {
            if reference.id.is_empty() {
                return Err(BridgeError::Validation(format!(
                    "profile '{}' binds {key}/{} to an empty action reference",
                    profile.id,
                    mode.as_str()
                )));
            }
        }
    }
    Ok(())
}

/// Validate a full structure, sanitizing its actions in place. Returns
/// [`BridgeError::ConfigCorrupt`] on a schema version mismatch so the
/// caller can fall back to the default structure.
pub fn validate_structure(structure: &mut MappingStructure) -> Result<()> {
    if structure.version != MAPPING_VERSION {
        return Err(BridgeError::ConfigCorrupt(format!(
            "mapping version '{}' does not match expected '{MAPPING_VERSION}'",
            structure.version
        )));
    }
    for key in &structure.keys {
        validate_key(key)?;
    }
    for action in &mut structure.actions {
        sanitize_action(action)?;
    }
    if !structure.profiles.contains_key(DEFAULT_PROFILE) {
        return Err(BridgeError::Validation(
            "default profile is missing".to_string(),
        ));
    }
    for profile in structure.profiles.values() {
        validate_profile(profile)?;
    }
    if let Some(selected) = &structure.selected_profile {
        if !structure.profiles.contains_key(selected) {
            return Err(BridgeError::Validation(format!(
                "selected profile '{selected}' does not exist"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::default::default_structure;
    use crate::mapping::schema::{Key, Mode};

    fn sample_key() -> Key {
        Key {
            id: "Digit1".to_string(),
            source: "server".to_string(),
            version: "1.0.0".to_string(),
            enabled: true,
            modes: vec![Mode::Press],
            description: None,
        }
    }

    #[test]
    fn test_key_validation_is_strict() {
        assert!(validate_key(&sample_key()).is_ok());

        let mut no_modes = sample_key();
        no_modes.modes.clear();
        assert!(validate_key(&no_modes).is_err());

        let mut no_source = sample_key();
        no_source.source.clear();
        assert!(validate_key(&no_source).is_err());
    }

    #[test]
    fn test_action_sanitization_is_permissive() {
        let mut action = Action {
            id: "play".to_string(),
            source: "music".to_string(),
            version: String::new(),
            enabled: true,
            value: None,
            icon: None,
            name: None,
            description: None,
        };
        sanitize_action(&mut action).unwrap();
        assert_eq!(action.version, "0.0.0");

        let mut no_id = action.clone();
        no_id.id.clear();
        assert!(sanitize_action(&mut no_id).is_err());
    }

    #[test]
    fn test_reference_inherits_source() {
        let mut reference = ActionReference {
            id: "play".to_string(),
            source: String::new(),
            value: None,
            enabled: true,
        };
        sanitize_reference(&mut reference, "music").unwrap();
        assert_eq!(reference.source, "music");
    }

    #[test]
    fn test_version_mismatch_is_corrupt() {
        let mut structure = default_structure();
        structure.version = "0.9.0".to_string();
        let err = validate_structure(&mut structure).unwrap_err();
        assert!(matches!(err, BridgeError::ConfigCorrupt(_)));
    }

    #[test]
    fn test_missing_default_profile_is_rejected() {
        let mut structure = default_structure();
        structure.profiles.remove("default");
        assert!(validate_structure(&mut structure).is_err());
    }

    #[test]
    fn test_default_structure_validates() {
        let mut structure = default_structure();
        assert!(validate_structure(&mut structure).is_ok());
    }
}
