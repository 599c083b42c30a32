//! deckbridge library - Local control plane bridging remote devices to
//! plugin-contributed actions.
//!
//! This library exposes the core functionality of the `deckbridge` CLI
//! and server for use in tests and potentially other applications.
//!
//! # Modules
//!
//! - `mapping`: Data model, validation, persistence, and routing engine
//! - `registry`: WebSocket connection registry (isolated server task)
//! - `coordinator`: Glue between registry events and the routing engine
//! - `dispatch`: Delivery seam toward plugin runtimes
//! - `settings`: Server settings file handling
//! - `error`: Error types with user-recoverable hints
#![forbid(unsafe_code)]

pub mod cli;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod mapping;
pub mod registry;
pub mod settings;
