//! The seam between the routing engine and plugin runtimes.
//!
//! The engine never talks to a plugin directly; it hands a payload to a
//! [`Dispatcher`], which owns delivery. The channel implementation used
//! in production forwards payloads over an unbounded queue consumed by
//! the plugin host, keeping dispatch non-blocking on the routing path.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::{BridgeError, Result};
use crate::mapping::schema::ActionReference;

/// What a plugin receives when one of its actions fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchPayload {
    pub action: ActionReference,
}

/// Delivery seam for resolved actions.
pub trait Dispatcher: Send + Sync {
    /// Deliver `payload` to the plugin identified by `source`.
    fn deliver(&self, source: &str, payload: DispatchPayload) -> Result<()>;
}

/// Dispatcher that forwards payloads over an in-process channel.
#[derive(Debug, Clone)]
pub struct ChannelDispatcher {
    tx: mpsc::UnboundedSender<(String, DispatchPayload)>,
}

impl ChannelDispatcher {
    /// Create the dispatcher and the receiving end the plugin host
    /// drains.
    pub fn new() -> (
        Self,
        mpsc::UnboundedReceiver<(String, DispatchPayload)>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Dispatcher for ChannelDispatcher {
    fn deliver(&self, source: &str, payload: DispatchPayload) -> Result<()> {
        let id = payload.action.id.clone();
        self.tx.send((source.to_string(), payload)).map_err(|_| {
            warn!(action = %id, source = %source, "plugin host is gone, dispatch dropped");
            BridgeError::DispatchSkipped {
                id,
                reason: format!("no live consumer for source '{source}'"),
            }
        })
    }
}
