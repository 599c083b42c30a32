//! Error types for control-plane operations.

use thiserror::Error;

/// Primary error type for the control plane.
///
/// Most engine operations absorb failures internally and report them only
/// through logging; this type covers the paths that do surface a `Result`:
/// persistence, the transport, and CLI-facing operations.
#[derive(Error, Debug)]
pub enum BridgeError {
    // Configuration errors
    #[error("Configuration is corrupt: {0}")]
    ConfigCorrupt(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(String),

    // Lookup errors
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // Transport errors
    #[error("Malformed frame from {client_id}: {reason}")]
    Protocol { client_id: String, reason: String },

    #[error("Server failed to start on {addr}: {reason}")]
    ServerFailed { addr: String, reason: String },

    // Dispatch errors
    #[error("Action {id} skipped: {reason}")]
    DispatchSkipped { id: String, reason: String },

    // General errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl BridgeError {
    /// Returns true if the error is recoverable by the user.
    pub const fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::Validation(_)
                | Self::ConfigParse(_)
                | Self::ServerFailed { .. }
        )
    }

    /// Returns a suggestion for how to fix the error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::NotFound { kind: "profile", .. } => Some("Run: deckbridge profiles list"),
            Self::NotFound { kind: "action", .. } => Some("Run: deckbridge actions"),
            Self::NotFound { kind: "key", .. } => Some("Run: deckbridge keys"),
            Self::ServerFailed { .. } => Some("Check that the port is free or pass --port"),
            Self::ConfigParse(_) => Some("Check the named file for syntax errors"),
            _ => None,
        }
    }
}

/// Convenience type alias for Results using BridgeError.
pub type Result<T> = std::result::Result<T, BridgeError>;
