//! Disk round-trips, corruption recovery, and the async writer task.

use deckbridge::mapping::{
    default_structure, load_mappings, save_mappings, spawn_persistence_writer, Action,
    MappingState, DEFAULT_PROFILE, MAPPING_VERSION,
};

fn plugin_action(id: &str) -> Action {
    Action {
        id: id.to_string(),
        source: "musicplugin".to_string(),
        version: "1.0.0".to_string(),
        enabled: true,
        value: None,
        icon: None,
        name: None,
        description: None,
    }
}

#[test]
fn engine_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    let mut state = MappingState::new(load_mappings(dir.path()));
    state.add_action(plugin_action("play")).unwrap();
    state.add_profile("gaming", None).unwrap();
    state.set_current_profile(Some("gaming")).unwrap();
    save_mappings(dir.path(), state.mapping());

    // Fresh engine from the same directory sees the same world.
    let restarted = MappingState::new(load_mappings(dir.path()));
    assert!(restarted.mapping().actions.iter().any(|a| a.id == "play"));
    assert_eq!(restarted.current_profile_name(), "gaming");
}

#[test]
fn corrupt_store_recovers_and_keeps_running() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("mappings.json"), "\0\0garbage").unwrap();

    let structure = load_mappings(dir.path());
    assert_eq!(structure.version, MAPPING_VERSION);
    assert!(structure.profiles.contains_key(DEFAULT_PROFILE));

    // The reset was persisted; the next load is clean.
    let reloaded = load_mappings(dir.path());
    assert_eq!(reloaded, structure);
}

#[tokio::test]
async fn writer_task_applies_snapshots_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, handle) = spawn_persistence_writer(dir.path().to_path_buf());

    let mut state = MappingState::new(default_structure()).with_persistence(tx);
    state.add_action(plugin_action("play")).unwrap();
    state.add_action(plugin_action("pause")).unwrap();
    state.remove_action("play").unwrap();

    // Dropping the engine closes the channel; the writer drains what is
    // queued and exits.
    drop(state);
    handle.await.unwrap();

    let loaded = load_mappings(dir.path());
    assert!(
        !loaded.actions.iter().any(|a| a.id == "play"),
        "last snapshot wins"
    );
    assert!(loaded.actions.iter().any(|a| a.id == "pause"));
}

#[test]
fn mutation_without_writer_still_works() {
    // Engines for one-shot CLI commands run without the async writer.
    let mut state = MappingState::new(default_structure());
    state.add_action(plugin_action("play")).unwrap();
    assert!(state.mapping().actions.iter().any(|a| a.id == "play"));
}
