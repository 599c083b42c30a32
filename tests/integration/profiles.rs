//! Profile lifecycle: clone semantics, protection, export and import.

use deckbridge::error::BridgeError;
use deckbridge::mapping::{
    default_structure, load_mappings, save_mappings, MappingState, Mode, ProfilePatch,
    DEFAULT_PROFILE,
};

#[test]
fn default_profile_always_present_and_protected() {
    let state = MappingState::new(default_structure());
    assert!(state.mapping().profiles.contains_key(DEFAULT_PROFILE));
    assert_eq!(state.current_profile_name(), DEFAULT_PROFILE);

    let mut state = state;
    assert!(matches!(
        state.remove_profile(DEFAULT_PROFILE),
        Err(BridgeError::Validation(_))
    ));
}

#[test]
fn new_profile_starts_as_copy_then_diverges() {
    let mut state = MappingState::new(default_structure());
    state.add_profile("gaming", None).unwrap();

    let default_bindings = state.mapping().profiles[DEFAULT_PROFILE].mapping.clone();
    assert_eq!(
        state.mapping().profiles["gaming"].mapping, default_bindings,
        "fresh copy matches the base"
    );

    state
        .remove_button(Some("gaming"), "Enter", Some(Mode::Press))
        .unwrap();
    assert_ne!(
        state.mapping().profiles["gaming"].mapping,
        state.mapping().profiles[DEFAULT_PROFILE].mapping,
        "edits do not leak back into the base"
    );
}

#[test]
fn duplicate_profile_name_is_rejected() {
    let mut state = MappingState::new(default_structure());
    state.add_profile("gaming", None).unwrap();
    assert!(matches!(
        state.add_profile("gaming", None),
        Err(BridgeError::Validation(_))
    ));
}

#[test]
fn selection_survives_restart_and_reverts_on_removal() {
    let dir = tempfile::tempdir().unwrap();
    let mut state = MappingState::new(load_mappings(dir.path()));
    state.add_profile("gaming", None).unwrap();
    state.set_current_profile(Some("gaming")).unwrap();
    save_mappings(dir.path(), state.mapping());

    let mut restarted = MappingState::new(load_mappings(dir.path()));
    assert_eq!(restarted.current_profile_name(), "gaming");

    restarted.remove_profile("gaming").unwrap();
    assert_eq!(restarted.current_profile_name(), DEFAULT_PROFILE);
}

#[test]
fn export_import_round_trip_preserves_bindings() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("exported.json");

    let mut state = MappingState::new(default_structure());
    state.add_profile("gaming", None).unwrap();
    state
        .update_profile(
            "gaming",
            ProfilePatch {
                description: Some("tuned for games".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    state.export_profile("gaming", &path).unwrap();

    let mut fresh = MappingState::new(default_structure());
    fresh.import_profile(&path, "from_disk").unwrap();

    let imported = &fresh.mapping().profiles["from_disk"];
    assert_eq!(imported.name, "from_disk", "identity rewritten on import");
    assert_eq!(imported.id, "from_disk");
    assert_eq!(imported.description.as_deref(), Some("tuned for games"));
    assert_eq!(
        imported.mapping,
        state.mapping().profiles["gaming"].mapping
    );
}

#[test]
fn import_of_garbage_file_fails_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(&path, "not a profile").unwrap();

    let mut state = MappingState::new(default_structure());
    assert!(state.import_profile(&path, "bad").is_err());
    assert!(!state.mapping().profiles.contains_key("bad"));
}

#[test]
fn patch_updates_are_deep_merged() {
    let mut state = MappingState::new(default_structure());
    state.add_profile("gaming", None).unwrap();

    let reference = state
        .resolve_binding("Enter", Mode::Press)
        .unwrap()
        .clone();
    let patch = ProfilePatch {
        trigger_app: Some("game-overlay".to_string()),
        mapping: Some(std::collections::HashMap::from([(
            "Enter".to_string(),
            std::collections::HashMap::from([(Mode::Release, reference)]),
        )])),
        ..Default::default()
    };
    state.update_profile("gaming", patch).unwrap();

    let profile = &state.mapping().profiles["gaming"];
    assert_eq!(profile.trigger_app.as_deref(), Some("game-overlay"));
    assert!(profile.mapping["Enter"].contains_key(&Mode::Press));
    assert!(profile.mapping["Enter"].contains_key(&Mode::Release));
}
