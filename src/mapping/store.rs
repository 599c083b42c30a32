//! The action-routing engine: exclusive owner of the [`MappingStructure`]
//! plus a secondary index from source id to the entities it contributed.
//!
//! The engine is a plain struct handed to its owner explicitly; there is
//! no global instance. Mutations persist fire-and-forget by sending a
//! structure snapshot over an unbounded channel drained by the
//! persistence writer, so the routing path never blocks on disk I/O.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dispatch::{DispatchPayload, Dispatcher};
use crate::error::{BridgeError, Result};
use crate::mapping::file;
use crate::mapping::schema::{
    Action, ActionPayload, ActionReference, ButtonMapping, Key, MappingStructure, Mode,
    ProfilePatch, DEFAULT_PROFILE,
};
use crate::mapping::validate::{sanitize_action, sanitize_reference, validate_key};

/// Entities contributed by one source, tracked so source removal can
/// cascade by direct lookup instead of scanning the whole structure.
#[derive(Debug, Default, Clone)]
struct SourceEntities {
    keys: HashSet<String>,
    actions: HashSet<String>,
    /// (profile name, key id, mode) triples whose binding references
    /// an action from this source.
    bindings: HashSet<(String, String, Mode)>,
}

/// The routing engine. All mutation goes through its methods, which keep
/// the source index coherent and enqueue a persistence snapshot.
#[derive(Debug)]
pub struct MappingState {
    structure: MappingStructure,
    sources: HashMap<String, SourceEntities>,
    persist: Option<mpsc::UnboundedSender<MappingStructure>>,
}

impl MappingState {
    /// Build the engine around an already-loaded structure, indexing it
    /// eagerly. Loading happens before construction, at startup, so
    /// there is no lazy-initialization window.
    pub fn new(structure: MappingStructure) -> Self {
        let sources = index_sources(&structure);
        Self {
            structure,
            sources,
            persist: None,
        }
    }

    /// Attach the fire-and-forget persistence channel.
    pub fn with_persistence(mut self, tx: mpsc::UnboundedSender<MappingStructure>) -> Self {
        self.persist = Some(tx);
        self
    }

    fn persist(&self) {
        if let Some(tx) = &self.persist {
            // The receiver only closes at shutdown; a failed send is
            // logged and absorbed like any other persistence failure.
            if tx.send(self.structure.clone()).is_err() {
                warn!("persistence writer is gone, snapshot dropped");
            }
        }
    }

    /// Read-only view of the full structure.
    pub fn mapping(&self) -> &MappingStructure {
        &self.structure
    }

    pub fn get_key(&self, id: &str) -> Option<&Key> {
        self.structure.keys.iter().find(|k| k.id == id)
    }

    pub fn get_action(&self, id: &str) -> Option<&Action> {
        self.structure.actions.iter().find(|a| a.id == id)
    }

    pub fn get_profile(&self, name: &str) -> Option<&ButtonMapping> {
        self.structure.profiles.get(name)
    }

    /// Name of the profile routing currently resolves against.
    pub fn current_profile_name(&self) -> &str {
        self.structure
            .selected_profile
            .as_deref()
            .unwrap_or(DEFAULT_PROFILE)
    }

    /// The profile routing currently resolves against.
    pub fn current_profile(&self) -> &ButtonMapping {
        let name = self.current_profile_name();
        // The default profile always exists and a dangling selection is
        // repaired at load and on profile removal.
        self.structure
            .profiles
            .get(name)
            .unwrap_or_else(|| &self.structure.profiles[DEFAULT_PROFILE])
    }

    // ---- keys ----

    /// Register a key, replacing any existing key with the same id.
    /// Re-adding is idempotent.
    pub fn add_key(&mut self, key: Key) -> Result<()> {
        validate_key(&key)?;
        self.sources
            .entry(key.source.clone())
            .or_default()
            .keys
            .insert(key.id.clone());
        if let Some(existing) = self.structure.keys.iter_mut().find(|k| k.id == key.id) {
            debug!(key = %key.id, "replacing existing key");
            *existing = key;
        } else {
            info!(key = %key.id, source = %key.source, "registered key");
            self.structure.keys.push(key);
        }
        self.persist();
        Ok(())
    }

    /// Remove a key entirely. Bindings targeting it become inert but are
    /// left in place so a re-registered key picks them back up.
    pub fn remove_key(&mut self, id: &str) -> Result<()> {
        let pos = self
            .structure
            .keys
            .iter()
            .position(|k| k.id == id)
            .ok_or_else(|| BridgeError::NotFound {
                kind: "key",
                id: id.to_string(),
            })?;
        let key = self.structure.keys.remove(pos);
        if let Some(entities) = self.sources.get_mut(&key.source) {
            entities.keys.remove(id);
        }
        info!(key = %id, "removed key");
        self.persist();
        Ok(())
    }

    // ---- actions ----

    /// Register an action, sanitizing missing optional fields, replacing
    /// any existing action with the same id. Re-adding is idempotent.
    pub fn add_action(&mut self, mut action: Action) -> Result<()> {
        sanitize_action(&mut action)?;
        self.sources
            .entry(action.source.clone())
            .or_default()
            .actions
            .insert(action.id.clone());
        if let Some(existing) = self
            .structure
            .actions
            .iter_mut()
            .find(|a| a.id == action.id)
        {
            debug!(action = %action.id, "replacing existing action");
            *existing = action;
        } else {
            info!(action = %action.id, source = %action.source, "registered action");
            self.structure.actions.push(action);
        }
        self.persist();
        Ok(())
    }

    /// Remove an action and disable every profile binding referencing it.
    pub fn remove_action(&mut self, id: &str) -> Result<()> {
        let pos = self
            .structure
            .actions
            .iter()
            .position(|a| a.id == id)
            .ok_or_else(|| BridgeError::NotFound {
                kind: "action",
                id: id.to_string(),
            })?;
        let action = self.structure.actions.remove(pos);
        if let Some(entities) = self.sources.get_mut(&action.source) {
            entities.actions.remove(id);
        }
        for profile in self.structure.profiles.values_mut() {
            for bindings in profile.mapping.values_mut() {
                for reference in bindings.values_mut() {
                    if reference.id == id {
                        reference.enabled = false;
                    }
                }
            }
        }
        info!(action = %id, "removed action, dependent bindings disabled");
        self.persist();
        Ok(())
    }

    /// Update an action's icon in place.
    pub fn update_icon(&mut self, id: &str, icon: &str) -> Result<()> {
        let action = self
            .structure
            .actions
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| BridgeError::NotFound {
                kind: "action",
                id: id.to_string(),
            })?;
        action.icon = Some(icon.to_string());
        self.persist();
        Ok(())
    }

    // ---- bindings ----

    /// Bind `key`+`mode` to an action reference in a profile (the default
    /// profile when `profile` is `None`). The key must exist and support
    /// the mode; the referenced action must be registered.
    pub fn add_button(
        &mut self,
        profile: Option<&str>,
        key_id: &str,
        mode: Mode,
        mut reference: ActionReference,
    ) -> Result<()> {
        let key = self.get_key(key_id).ok_or_else(|| BridgeError::NotFound {
            kind: "key",
            id: key_id.to_string(),
        })?;
        if !key.modes.contains(&mode) {
            return Err(BridgeError::Validation(format!(
                "key '{key_id}' does not support mode '{}'",
                mode.as_str()
            )));
        }
        let action = self
            .get_action(&reference.id)
            .ok_or_else(|| BridgeError::NotFound {
                kind: "action",
                id: reference.id.clone(),
            })?;
        let action_source = action.source.clone();
        sanitize_reference(&mut reference, &action_source)?;

        let profile_name = profile.unwrap_or(DEFAULT_PROFILE).to_string();
        let target = self
            .structure
            .profiles
            .get_mut(&profile_name)
            .ok_or_else(|| BridgeError::NotFound {
                kind: "profile",
                id: profile_name.clone(),
            })?;

        // If an older binding occupied this slot, drop its index entry.
        if let Some(previous) = target
            .mapping
            .get(key_id)
            .and_then(|bindings| bindings.get(&mode))
        {
            let previous_source = previous.source.clone();
            if let Some(entities) = self.sources.get_mut(&previous_source) {
                entities
                    .bindings
                    .remove(&(profile_name.clone(), key_id.to_string(), mode));
            }
        }

        let reference_source = reference.source.clone();
        let target = self
            .structure
            .profiles
            .get_mut(&profile_name)
            .ok_or_else(|| BridgeError::NotFound {
                kind: "profile",
                id: profile_name.clone(),
            })?;
        target
            .mapping
            .entry(key_id.to_string())
            .or_default()
            .insert(mode, reference);
        self.sources
            .entry(reference_source)
            .or_default()
            .bindings
            .insert((profile_name.clone(), key_id.to_string(), mode));

        debug!(profile = %profile_name, key = %key_id, mode = mode.as_str(), "bound action");
        self.persist();
        Ok(())
    }

    /// Remove bindings for a key in a profile (the default profile when
    /// `None`): one binding when a mode is given, the key's whole entry
    /// when `mode` is `None`. Removing what is not there is a no-op.
    pub fn remove_button(
        &mut self,
        profile: Option<&str>,
        key_id: &str,
        mode: Option<Mode>,
    ) -> Result<()> {
        let profile_name = profile.unwrap_or(DEFAULT_PROFILE).to_string();
        let target = self
            .structure
            .profiles
            .get_mut(&profile_name)
            .ok_or_else(|| BridgeError::NotFound {
                kind: "profile",
                id: profile_name.clone(),
            })?;

        let removed: Vec<(Mode, ActionReference)> = match mode {
            Some(mode) => target
                .mapping
                .get_mut(key_id)
                .and_then(|bindings| bindings.remove(&mode))
                .map(|reference| (mode, reference))
                .into_iter()
                .collect(),
            None => target
                .mapping
                .remove(key_id)
                .map(std::collections::HashMap::into_iter)
                .into_iter()
                .flatten()
                .collect(),
        };
        if let Some(bindings) = target.mapping.get(key_id) {
            if bindings.is_empty() {
                target.mapping.remove(key_id);
            }
        }

        if removed.is_empty() {
            debug!(profile = %profile_name, key = %key_id, "no binding to remove");
            return Ok(());
        }
        for (mode, reference) in removed {
            if let Some(entities) = self.sources.get_mut(&reference.source) {
                entities
                    .bindings
                    .remove(&(profile_name.clone(), key_id.to_string(), mode));
            }
        }
        debug!(profile = %profile_name, key = %key_id, "unbound");
        self.persist();
        Ok(())
    }

    // ---- sources ----

    /// Re-enable every key, action, and binding contributed by `source`.
    /// Unknown sources are a no-op.
    pub fn add_source(&mut self, source: &str) {
        let Some(entities) = self.sources.get(source).cloned() else {
            debug!(source = %source, "source has no tracked entities");
            return;
        };
        self.set_source_enabled(source, &entities, true);
        info!(source = %source, "source enabled");
        self.persist();
    }

    /// Disable (never delete) every key, action, and binding contributed
    /// by `source`, so a later [`add_source`](Self::add_source) restores
    /// the exact prior state.
    pub fn remove_source(&mut self, source: &str) {
        let Some(entities) = self.sources.get(source).cloned() else {
            debug!(source = %source, "source has no tracked entities");
            return;
        };
        self.set_source_enabled(source, &entities, false);
        info!(source = %source, "source disabled");
        self.persist();
    }

    fn set_source_enabled(&mut self, source: &str, entities: &SourceEntities, enabled: bool) {
        for key in &mut self.structure.keys {
            if key.source == source && entities.keys.contains(&key.id) {
                key.enabled = enabled;
            }
        }
        for action in &mut self.structure.actions {
            if action.source == source && entities.actions.contains(&action.id) {
                action.enabled = enabled;
            }
        }
        for (profile_name, key_id, mode) in &entities.bindings {
            if let Some(reference) = self
                .structure
                .profiles
                .get_mut(profile_name)
                .and_then(|p| p.mapping.get_mut(key_id))
                .and_then(|bindings| bindings.get_mut(mode))
            {
                // The slot may have been rebound since the triple was
                // indexed; only touch references still owned by `source`.
                if reference.source == source {
                    reference.enabled = enabled;
                }
            }
        }
    }

    // ---- profiles ----

    /// Create a profile by deep-copying `base` (the default profile when
    /// `None`) under the new name, with id `{base_id}_{name}`.
    pub fn add_profile(&mut self, name: &str, base: Option<&str>) -> Result<()> {
        if self.structure.profiles.contains_key(name) {
            return Err(BridgeError::Validation(format!(
                "profile '{name}' already exists"
            )));
        }
        let base_name = base.unwrap_or(DEFAULT_PROFILE);
        let base_profile =
            self.structure
                .profiles
                .get(base_name)
                .ok_or_else(|| BridgeError::NotFound {
                    kind: "profile",
                    id: base_name.to_string(),
                })?;
        let profile = base_profile.clone_as(name);
        self.index_profile_bindings(name, &profile);
        self.structure.profiles.insert(name.to_string(), profile);
        info!(profile = %name, base = %base_name, "created profile");
        self.persist();
        Ok(())
    }

    /// Remove a profile. The default profile is protected; removing the
    /// selected profile reverts the selection to default.
    pub fn remove_profile(&mut self, name: &str) -> Result<()> {
        if name == DEFAULT_PROFILE {
            return Err(BridgeError::Validation(
                "the default profile cannot be removed".to_string(),
            ));
        }
        let profile = self
            .structure
            .profiles
            .remove(name)
            .ok_or_else(|| BridgeError::NotFound {
                kind: "profile",
                id: name.to_string(),
            })?;
        for bindings in profile.mapping.values() {
            for reference in bindings.values() {
                if let Some(entities) = self.sources.get_mut(&reference.source) {
                    entities
                        .bindings
                        .retain(|(profile_name, _, _)| profile_name != name);
                }
            }
        }
        if self.structure.selected_profile.as_deref() == Some(name) {
            warn!(profile = %name, "removed the selected profile, reverting to default");
            self.structure.selected_profile = None;
        }
        info!(profile = %name, "removed profile");
        self.persist();
        Ok(())
    }

    /// Switch the active profile. `None` or `"default"` selects default.
    pub fn set_current_profile(&mut self, name: Option<&str>) -> Result<()> {
        match name {
            None => self.structure.selected_profile = None,
            Some(DEFAULT_PROFILE) => self.structure.selected_profile = None,
            Some(name) => {
                if !self.structure.profiles.contains_key(name) {
                    return Err(BridgeError::NotFound {
                        kind: "profile",
                        id: name.to_string(),
                    });
                }
                self.structure.selected_profile = Some(name.to_string());
            }
        }
        info!(profile = %self.current_profile_name(), "selected profile");
        self.persist();
        Ok(())
    }

    /// Deep-merge a partial update into a profile.
    pub fn update_profile(&mut self, name: &str, patch: ProfilePatch) -> Result<()> {
        if !self.structure.profiles.contains_key(name) {
            return Err(BridgeError::NotFound {
                kind: "profile",
                id: name.to_string(),
            });
        }
        // Slots the patch overwrites leave their old source's index; new
        // bindings land in theirs.
        if let Some(mapping) = &patch.mapping {
            let mut replaced: Vec<(String, String, Mode)> = Vec::new();
            let profile = &self.structure.profiles[name];
            for (key_id, bindings) in mapping {
                for mode in bindings.keys() {
                    if let Some(previous) =
                        profile.mapping.get(key_id).and_then(|b| b.get(mode))
                    {
                        replaced.push((previous.source.clone(), key_id.clone(), *mode));
                    }
                }
            }
            for (source, key_id, mode) in replaced {
                if let Some(entities) = self.sources.get_mut(&source) {
                    entities.bindings.remove(&(name.to_string(), key_id, mode));
                }
            }
            for (key_id, bindings) in mapping {
                for (mode, reference) in bindings {
                    self.sources
                        .entry(reference.source.clone())
                        .or_default()
                        .bindings
                        .insert((name.to_string(), key_id.clone(), *mode));
                }
            }
        }
        let profile = self
            .structure
            .profiles
            .get_mut(name)
            .ok_or_else(|| BridgeError::NotFound {
                kind: "profile",
                id: name.to_string(),
            })?;
        patch.apply(profile);
        debug!(profile = %name, "updated profile");
        self.persist();
        Ok(())
    }

    /// Write a profile to an arbitrary path.
    pub fn export_profile(&self, name: &str, path: &Path) -> Result<()> {
        file::export_profile(&self.structure, name, path)
    }

    /// Read a profile from an arbitrary path and install it under a new
    /// name, rewriting its identity to that name.
    pub fn import_profile(&mut self, path: &Path, name: &str) -> Result<()> {
        let mut profile = file::read_profile_file(path)?;
        profile.id = name.to_string();
        profile.name = name.to_string();
        // Importing over an existing name replaces its bindings wholesale,
        // so the old ones leave the index first.
        if let Some(existing) = self.structure.profiles.get(name).cloned() {
            self.deindex_profile_bindings(name, &existing);
        }
        self.index_profile_bindings(name, &profile);
        self.structure.profiles.insert(name.to_string(), profile);
        info!(profile = %name, path = %path.display(), "imported profile");
        self.persist();
        Ok(())
    }

    fn index_profile_bindings(&mut self, profile_name: &str, profile: &ButtonMapping) {
        for (key_id, bindings) in &profile.mapping {
            for (mode, reference) in bindings {
                self.sources
                    .entry(reference.source.clone())
                    .or_default()
                    .bindings
                    .insert((profile_name.to_string(), key_id.clone(), *mode));
            }
        }
    }

    fn deindex_profile_bindings(&mut self, profile_name: &str, profile: &ButtonMapping) {
        for (key_id, bindings) in &profile.mapping {
            for (mode, reference) in bindings {
                if let Some(entities) = self.sources.get_mut(&reference.source) {
                    entities
                        .bindings
                        .remove(&(profile_name.to_string(), key_id.clone(), *mode));
                }
            }
        }
    }

    // ---- routing ----

    /// Resolve the binding for `key`+`mode` in the active profile.
    pub fn resolve_binding(&self, key_id: &str, mode: Mode) -> Option<&ActionReference> {
        self.current_profile()
            .mapping
            .get(key_id)
            .and_then(|bindings| bindings.get(&mode))
    }

    /// Dispatch an action. The payload may be a full action or a bare
    /// reference; both collapse to the reference form before delivery.
    /// A disabled action (or reference, or one whose registered action
    /// is disabled or missing) is skipped, never partially run.
    pub fn run_action(&self, payload: ActionPayload, dispatcher: &dyn Dispatcher) -> Result<()> {
        let reference = payload.into_reference();
        if !reference.enabled {
            return Err(BridgeError::DispatchSkipped {
                id: reference.id,
                reason: "binding is disabled".to_string(),
            });
        }
        let action = self
            .get_action(&reference.id)
            .ok_or_else(|| BridgeError::DispatchSkipped {
                id: reference.id.clone(),
                reason: "action is not registered".to_string(),
            })?;
        if !action.enabled {
            return Err(BridgeError::DispatchSkipped {
                id: reference.id,
                reason: "action is disabled".to_string(),
            });
        }
        let source = action.source.clone();
        debug!(action = %reference.id, source = %source, "dispatching action");
        dispatcher.deliver(&source, DispatchPayload { action: reference })
    }
}

fn index_sources(structure: &MappingStructure) -> HashMap<String, SourceEntities> {
    let mut sources: HashMap<String, SourceEntities> = HashMap::new();
    for key in &structure.keys {
        sources
            .entry(key.source.clone())
            .or_default()
            .keys
            .insert(key.id.clone());
    }
    for action in &structure.actions {
        sources
            .entry(action.source.clone())
            .or_default()
            .actions
            .insert(action.id.clone());
    }
    for (profile_name, profile) in &structure.profiles {
        for (key_id, bindings) in &profile.mapping {
            for (mode, reference) in bindings {
                sources
                    .entry(reference.source.clone())
                    .or_default()
                    .bindings
                    .insert((profile_name.clone(), key_id.clone(), *mode));
            }
        }
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ChannelDispatcher;
    use crate::mapping::default::default_structure;

    fn engine() -> MappingState {
        MappingState::new(default_structure())
    }

    fn plugin_key(id: &str) -> Key {
        Key {
            id: id.to_string(),
            source: "musicplugin".to_string(),
            version: "1.0.0".to_string(),
            enabled: true,
            modes: vec![Mode::Press, Mode::LongPress],
            description: None,
        }
    }

    fn plugin_action(id: &str) -> Action {
        source_action(id, "musicplugin")
    }

    fn source_action(id: &str, source: &str) -> Action {
        Action {
            id: id.to_string(),
            source: source.to_string(),
            version: "1.0.0".to_string(),
            enabled: true,
            value: None,
            icon: None,
            name: None,
            description: None,
        }
    }

    #[test]
    fn test_add_key_is_idempotent() {
        let mut state = engine();
        let before = state.mapping().keys.len();
        state.add_key(plugin_key("PlayKey")).unwrap();
        state.add_key(plugin_key("PlayKey")).unwrap();
        assert_eq!(state.mapping().keys.len(), before + 1);
    }

    #[test]
    fn test_bind_requires_supported_mode() {
        let mut state = engine();
        state.add_key(plugin_key("PlayKey")).unwrap();
        state.add_action(plugin_action("play")).unwrap();
        let reference = ActionReference::from(&plugin_action("play"));

        let err = state
            .add_button(None, "PlayKey", Mode::ScrollUp, reference.clone())
            .unwrap_err();
        assert!(matches!(err, BridgeError::Validation(_)));

        state
            .add_button(None, "PlayKey", Mode::Press, reference)
            .unwrap();
        assert!(state.resolve_binding("PlayKey", Mode::Press).is_some());
    }

    #[test]
    fn test_bind_requires_registered_action() {
        let mut state = engine();
        state.add_key(plugin_key("PlayKey")).unwrap();
        let reference = ActionReference::from(&plugin_action("ghost"));
        let err = state
            .add_button(None, "PlayKey", Mode::Press, reference)
            .unwrap_err();
        assert!(matches!(err, BridgeError::NotFound { kind: "action", .. }));
    }

    #[test]
    fn test_source_removal_disables_and_restores() {
        let mut state = engine();
        state.add_key(plugin_key("PlayKey")).unwrap();
        state.add_action(plugin_action("play")).unwrap();
        state
            .add_button(
                None,
                "PlayKey",
                Mode::Press,
                ActionReference::from(&plugin_action("play")),
            )
            .unwrap();

        state.remove_source("musicplugin");
        let key = state
            .mapping()
            .keys
            .iter()
            .find(|k| k.id == "PlayKey")
            .unwrap();
        assert!(!key.enabled, "key disabled, not deleted");
        let action = state
            .mapping()
            .actions
            .iter()
            .find(|a| a.id == "play")
            .unwrap();
        assert!(!action.enabled);
        let binding = state.resolve_binding("PlayKey", Mode::Press).unwrap();
        assert!(!binding.enabled);

        state.add_source("musicplugin");
        let key = state
            .mapping()
            .keys
            .iter()
            .find(|k| k.id == "PlayKey")
            .unwrap();
        assert!(key.enabled);
        let binding = state.resolve_binding("PlayKey", Mode::Press).unwrap();
        assert!(binding.enabled, "round-trip restores the exact prior state");
    }

    #[test]
    fn test_source_cascade_leaves_other_sources_alone() {
        let mut state = engine();
        state.add_key(plugin_key("PlayKey")).unwrap();
        state.remove_source("musicplugin");
        let server_key = state
            .mapping()
            .keys
            .iter()
            .find(|k| k.source == "server")
            .unwrap();
        assert!(server_key.enabled);
    }

    #[test]
    fn test_rebound_slot_detaches_from_the_old_source() {
        let mut state = engine();
        state.add_key(plugin_key("PlayKey")).unwrap();
        state.add_action(source_action("play", "musicplugin")).unwrap();
        state.add_action(source_action("play_video", "videoplugin")).unwrap();
        state
            .add_button(
                None,
                "PlayKey",
                Mode::Press,
                ActionReference::from(&source_action("play", "musicplugin")),
            )
            .unwrap();

        // Rebind the same slot to the other source via a patch merge.
        let patch = ProfilePatch {
            mapping: Some(HashMap::from([(
                "PlayKey".to_string(),
                HashMap::from([(
                    Mode::Press,
                    ActionReference::from(&source_action("play_video", "videoplugin")),
                )]),
            )])),
            ..Default::default()
        };
        state.update_profile(DEFAULT_PROFILE, patch).unwrap();

        state.remove_source("musicplugin");
        let binding = state.resolve_binding("PlayKey", Mode::Press).unwrap();
        assert!(
            binding.enabled,
            "binding now belongs to videoplugin and must stay enabled"
        );

        state.remove_source("videoplugin");
        let binding = state.resolve_binding("PlayKey", Mode::Press).unwrap();
        assert!(!binding.enabled, "the owning source still cascades");
    }

    #[test]
    fn test_import_over_existing_name_reindexes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clean.json");

        // A pristine default profile exported from a fresh engine.
        engine().export_profile(DEFAULT_PROFILE, &path).unwrap();

        let mut state = engine();
        state.add_key(plugin_key("PlayKey")).unwrap();
        state.add_action(plugin_action("play")).unwrap();
        state.add_profile("gaming", None).unwrap();
        state
            .add_button(
                Some("gaming"),
                "PlayKey",
                Mode::Press,
                ActionReference::from(&plugin_action("play")),
            )
            .unwrap();

        state.import_profile(&path, "gaming").unwrap();
        assert!(
            !state.mapping().profiles["gaming"]
                .mapping
                .contains_key("PlayKey"),
            "import replaces the bindings wholesale"
        );

        // The replaced binding's index entry is gone; toggling its old
        // source leaves the imported profile untouched.
        assert!(state.sources.get("musicplugin").is_none_or(|e| {
            !e.bindings
                .contains(&("gaming".to_string(), "PlayKey".to_string(), Mode::Press))
        }));
        state.remove_source("musicplugin");
        state.add_source("musicplugin");
        for bindings in state.mapping().profiles["gaming"].mapping.values() {
            for reference in bindings.values() {
                assert!(reference.enabled);
            }
        }
    }

    #[test]
    fn test_bind_defaults_to_the_default_profile() {
        let mut state = engine();
        state.add_key(plugin_key("PlayKey")).unwrap();
        state.add_action(plugin_action("play")).unwrap();
        state.add_profile("gaming", None).unwrap();
        state.set_current_profile(Some("gaming")).unwrap();

        state
            .add_button(
                None,
                "PlayKey",
                Mode::Press,
                ActionReference::from(&plugin_action("play")),
            )
            .unwrap();

        assert!(state.mapping().profiles[DEFAULT_PROFILE]
            .mapping
            .contains_key("PlayKey"));
        assert!(
            !state.mapping().profiles["gaming"]
                .mapping
                .contains_key("PlayKey"),
            "an omitted profile targets default, not the selection"
        );
    }

    #[test]
    fn test_default_profile_is_protected() {
        let mut state = engine();
        let err = state.remove_profile(DEFAULT_PROFILE).unwrap_err();
        assert!(matches!(err, BridgeError::Validation(_)));
    }

    #[test]
    fn test_removing_selected_profile_reverts_to_default() {
        let mut state = engine();
        state.add_profile("gaming", None).unwrap();
        state.set_current_profile(Some("gaming")).unwrap();
        assert_eq!(state.current_profile_name(), "gaming");

        state.remove_profile("gaming").unwrap();
        assert_eq!(state.current_profile_name(), DEFAULT_PROFILE);
    }

    #[test]
    fn test_profile_clone_is_deep() {
        let mut state = engine();
        state.add_profile("gaming", None).unwrap();
        state
            .remove_button(Some("gaming"), "Enter", Some(Mode::Press))
            .unwrap();
        assert!(state.mapping().profiles[DEFAULT_PROFILE]
            .mapping
            .contains_key("Enter"));
        assert!(!state.mapping().profiles["gaming"]
            .mapping
            .contains_key("Enter")
            || !state.mapping().profiles["gaming"].mapping["Enter"]
                .contains_key(&Mode::Press));
    }

    #[test]
    fn test_remove_button_without_mode_clears_the_key() {
        let mut state = engine();
        assert!(state.resolve_binding("Enter", Mode::Press).is_some());
        assert!(state.resolve_binding("Enter", Mode::LongPress).is_some());

        state.remove_button(None, "Enter", None).unwrap();
        assert!(state.resolve_binding("Enter", Mode::Press).is_none());
        assert!(state.resolve_binding("Enter", Mode::LongPress).is_none());

        // Removing again is a logged no-op.
        state.remove_button(None, "Enter", None).unwrap();
    }

    #[test]
    fn test_select_unknown_profile_fails() {
        let mut state = engine();
        let err = state.set_current_profile(Some("missing")).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::NotFound { kind: "profile", .. }
        ));
    }

    #[test]
    fn test_export_import_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gaming.json");

        let mut state = engine();
        state.add_profile("gaming", None).unwrap();
        state.export_profile("gaming", &path).unwrap();

        let mut other = engine();
        other.import_profile(&path, "imported").unwrap();
        let imported = &other.mapping().profiles["imported"];
        assert_eq!(imported.id, "imported");
        assert_eq!(imported.name, "imported");
        assert_eq!(
            imported.mapping,
            state.mapping().profiles["gaming"].mapping,
            "bindings survive the round trip"
        );
    }

    #[test]
    fn test_run_action_skips_disabled() {
        let mut state = engine();
        state.add_action(plugin_action("play")).unwrap();
        state.remove_source("musicplugin");

        let (dispatcher, mut rx) = ChannelDispatcher::new();
        let payload = ActionPayload::Reference(ActionReference {
            id: "play".to_string(),
            source: "musicplugin".to_string(),
            value: None,
            enabled: true,
        });
        let err = state.run_action(payload, &dispatcher).unwrap_err();
        assert!(matches!(err, BridgeError::DispatchSkipped { .. }));
        assert!(rx.try_recv().is_err(), "nothing delivered");
    }

    #[test]
    fn test_run_action_delivers_to_source() {
        let mut state = engine();
        state.add_action(plugin_action("play")).unwrap();

        let (dispatcher, mut rx) = ChannelDispatcher::new();
        let payload = ActionPayload::Action(plugin_action("play"));
        state.run_action(payload, &dispatcher).unwrap();

        let (source, delivered) = rx.try_recv().unwrap();
        assert_eq!(source, "musicplugin");
        assert_eq!(delivered.action.id, "play");
    }

    #[test]
    fn test_update_icon() {
        let mut state = engine();
        state.add_action(plugin_action("play")).unwrap();
        state.update_icon("play", "play-alt").unwrap();
        let action = state
            .mapping()
            .actions
            .iter()
            .find(|a| a.id == "play")
            .unwrap();
        assert_eq!(action.icon.as_deref(), Some("play-alt"));

        assert!(state.update_icon("ghost", "x").is_err());
    }

    #[test]
    fn test_remove_action_disables_bindings() {
        let mut state = engine();
        state.add_key(plugin_key("PlayKey")).unwrap();
        state.add_action(plugin_action("play")).unwrap();
        state
            .add_button(
                None,
                "PlayKey",
                Mode::Press,
                ActionReference::from(&plugin_action("play")),
            )
            .unwrap();

        state.remove_action("play").unwrap();
        let binding = state.resolve_binding("PlayKey", Mode::Press).unwrap();
        assert!(!binding.enabled);
    }

    #[test]
    fn test_persistence_snapshot_per_mutation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut state = MappingState::new(default_structure()).with_persistence(tx);
        state.add_action(plugin_action("play")).unwrap();
        state.add_key(plugin_key("PlayKey")).unwrap();

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert!(first.actions.iter().any(|a| a.id == "play"));
        assert!(second.keys.iter().any(|k| k.id == "PlayKey"));
        assert!(rx.try_recv().is_err());
    }
}
