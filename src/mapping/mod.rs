//! Key→mode→action mapping: data model, validation, persistence, and the
//! routing engine that owns the live structure.

pub mod default;
pub mod file;
pub mod schema;
pub mod store;
pub mod validate;

pub use default::default_structure;
pub use file::{default_mappings_dir, load_mappings, save_mappings, spawn_persistence_writer};
pub use schema::{
    Action, ActionPayload, ActionReference, ButtonMapping, Key, KeyBindings, MappingStructure,
    Mode, ProfilePatch, DEFAULT_PROFILE, MAPPING_VERSION,
};
pub use store::MappingState;
