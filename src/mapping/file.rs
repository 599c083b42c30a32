//! On-disk persistence for the mapping structure.
//!
//! Layout under the mappings directory:
//!   - `mappings.json`: root file holding keys, actions, the profile
//!     name-to-id table, and the selected profile.
//!   - `<profile_id>.json`: one file per profile.
//!
//! Loading is tolerant: an unreadable or version-mismatched root file is
//! logged, replaced with the built-in default, and the default is
//! returned. A single unreadable profile file drops only that profile.
//! Saving is fail-safe: errors are logged and absorbed, never surfaced
//! to the routing path.

use std::fs;
use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::{BridgeError, Result};
use crate::mapping::default::default_structure;
use crate::mapping::schema::{
    ButtonMapping, MappingFileStructure, MappingStructure, MAPPING_VERSION,
};
use crate::mapping::validate::{validate_profile, validate_structure};

const ROOT_FILE: &str = "mappings.json";

/// Default mappings directory: `<config_dir>/deckbridge/mappings`.
pub fn default_mappings_dir() -> Result<PathBuf> {
    let base = dirs::config_dir()
        .ok_or_else(|| BridgeError::Other("could not determine config directory".to_string()))?;
    Ok(base.join("deckbridge").join("mappings"))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)?;
    serde_json::from_str(&text)
        .map_err(|e| BridgeError::ConfigParse(format!("{}: {e}", path.display())))
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text)?;
    Ok(())
}

fn load_profile(dir: &Path, id: &str) -> Result<ButtonMapping> {
    let path = dir.join(format!("{id}.json"));
    let profile: ButtonMapping = read_json(&path)?;
    validate_profile(&profile)?;
    Ok(profile)
}

/// Load the complete structure from `dir`, falling back to the built-in
/// default (and persisting it) when the root file is missing, unreadable,
/// or carries an unexpected schema version.
pub fn load_mappings(dir: &Path) -> MappingStructure {
    let root_path = dir.join(ROOT_FILE);
    if !root_path.exists() {
        info!(path = %root_path.display(), "no stored mappings, writing defaults");
        let structure = default_structure();
        save_mappings(dir, &structure);
        return structure;
    }

    let root: MappingFileStructure = match read_json(&root_path) {
        Ok(root) => root,
        Err(e) => {
            error!(error = %e, "failed to read root mapping file, resetting to defaults");
            let structure = default_structure();
            save_mappings(dir, &structure);
            return structure;
        }
    };

    if root.version != MAPPING_VERSION {
        error!(
            found = %root.version,
            expected = MAPPING_VERSION,
            "mapping schema version mismatch, resetting to defaults"
        );
        let structure = default_structure();
        save_mappings(dir, &structure);
        return structure;
    }

    // Partial tolerance: a broken profile file drops only that profile.
    let mut profiles = std::collections::HashMap::new();
    for (name, id) in &root.profiles {
        match load_profile(dir, id) {
            Ok(profile) => {
                profiles.insert(name.clone(), profile);
            }
            Err(e) => {
                warn!(profile = %name, id = %id, error = %e, "skipping unreadable profile");
            }
        }
    }

    let mut structure = MappingStructure {
        version: root.version,
        keys: root.keys,
        actions: root.actions,
        profiles,
        selected_profile: root.selected_profile,
    };

    // The default profile must always exist, and the selection must
    // resolve; repair both rather than failing the load.
    if !structure
        .profiles
        .contains_key(crate::mapping::schema::DEFAULT_PROFILE)
    {
        warn!("default profile missing from store, restoring built-in");
        structure.profiles.insert(
            crate::mapping::schema::DEFAULT_PROFILE.to_string(),
            crate::mapping::default::default_profile(),
        );
    }
    if let Some(selected) = &structure.selected_profile {
        if !structure.profiles.contains_key(selected) {
            warn!(profile = %selected, "selected profile missing, reverting to default");
            structure.selected_profile = None;
        }
    }

    if let Err(e) = validate_structure(&mut structure) {
        error!(error = %e, "stored mappings failed validation, resetting to defaults");
        let structure = default_structure();
        save_mappings(dir, &structure);
        return structure;
    }

    debug!(
        keys = structure.keys.len(),
        actions = structure.actions.len(),
        profiles = structure.profiles.len(),
        "loaded mappings"
    );
    structure
}

/// Persist the full structure: the root file plus one file per profile.
/// A structure that fails validation is replaced by the built-in default
/// rather than written as-is. Failures are logged and absorbed.
pub fn save_mappings(dir: &Path, structure: &MappingStructure) {
    let mut checked = structure.clone();
    if let Err(e) = validate_structure(&mut checked) {
        error!(error = %e, "refusing to persist invalid structure, writing defaults");
        write_structure(dir, &default_structure());
        return;
    }
    write_structure(dir, &checked);
}

fn write_structure(dir: &Path, structure: &MappingStructure) {
    if let Err(e) = fs::create_dir_all(dir) {
        error!(path = %dir.display(), error = %e, "failed to create mappings directory");
        return;
    }

    let root = MappingFileStructure::from(structure);
    if let Err(e) = write_json(&dir.join(ROOT_FILE), &root) {
        error!(error = %e, "failed to write root mapping file");
        return;
    }

    for profile in structure.profiles.values() {
        let path = dir.join(format!("{}.json", profile.id));
        if let Err(e) = write_json(&path, profile) {
            error!(profile = %profile.name, error = %e, "failed to write profile file");
        }
    }
}

/// Export one profile to an arbitrary path.
pub fn export_profile(structure: &MappingStructure, name: &str, path: &Path) -> Result<()> {
    let profile = structure
        .profiles
        .get(name)
        .ok_or_else(|| BridgeError::NotFound {
            kind: "profile",
            id: name.to_string(),
        })?;
    write_json(path, profile)
}

/// Read a profile from an arbitrary path, validating it but leaving the
/// identity rewrite to the caller.
pub fn read_profile_file(path: &Path) -> Result<ButtonMapping> {
    let profile: ButtonMapping = read_json(path)?;
    validate_profile(&profile)?;
    Ok(profile)
}

/// Spawn the fire-and-forget persistence writer: structure snapshots
/// arrive over the channel and are written sequentially in arrival
/// order. The sender side never observes write failures.
pub fn spawn_persistence_writer(
    dir: PathBuf,
) -> (
    mpsc::UnboundedSender<MappingStructure>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<MappingStructure>();
    let handle = tokio::spawn(async move {
        while let Some(snapshot) = rx.recv().await {
            let dir = dir.clone();
            let result = tokio::task::spawn_blocking(move || save_mappings(&dir, &snapshot)).await;
            if let Err(e) = result {
                error!(error = %e, "persistence writer task panicked");
            }
        }
        debug!("persistence writer shut down");
    });
    (tx, handle)
}
