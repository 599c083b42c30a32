//! Connected-device bookkeeping and the JSON wire protocol spoken over
//! each WebSocket session. All frames are JSON text, tagged by `type`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mapping::schema::{ActionPayload, ButtonMapping, Mode};

/// A connected remote device session.
#[derive(Debug, Clone, Serialize)]
pub struct Client {
    /// Registry-assigned id, of the form `ws-<uuid>`.
    pub connection_id: String,
    pub connected: bool,
    pub connected_at: DateTime<Utc>,
    /// Peer address, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// Self-reported device name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Self-reported device type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
}

impl Client {
    pub fn new(connection_id: String, ip: Option<String>) -> Self {
        Self {
            connection_id,
            connected: true,
            connected_at: Utc::now(),
            ip,
            name: None,
            device_type: None,
        }
    }
}

/// A partial client update, merged field-by-field into the stored
/// record. `None` fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientPatch {
    pub name: Option<String>,
    pub device_type: Option<String>,
}

impl ClientPatch {
    pub fn apply(self, client: &mut Client) {
        if let Some(name) = self.name {
            client.name = Some(name);
        }
        if let Some(device_type) = self.device_type {
            client.device_type = Some(device_type);
        }
    }
}

/// A key event as reported by a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyEvent {
    /// Key id, e.g. "Digit1".
    pub id: String,
    pub mode: Mode,
}

/// Inbound frames: device → server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceMessage {
    /// A key interaction to resolve against the active profile.
    Key { payload: KeyEvent },
    /// A direct action invocation, bypassing key resolution.
    Action { payload: ActionPayload },
    /// Device self-identification, merged into the client record.
    Identify { payload: ClientPatch },
    Ping,
}

/// Outbound frames: server → device.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The active profile, pushed on connect and after config changes.
    Profile { payload: ButtonMapping },
    Error { message: String },
    Pong,
}
