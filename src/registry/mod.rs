//! The connection registry: an isolated WebSocket server task that owns
//! all device sessions and talks to the rest of the process exclusively
//! over typed channels, commands in and events out. Nothing outside this
//! module touches a socket.

pub mod client;
pub mod server;

use tokio::sync::{mpsc, oneshot};

pub use client::{Client, ClientPatch, DeviceMessage, KeyEvent, ServerMessage};
pub use server::ConnectionRegistry;

/// Commands into the registry task.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Send one frame to one client; replies whether it was accepted for
    /// delivery (false when the client is unknown or its socket closed).
    SendData {
        connection_id: String,
        message: ServerMessage,
        reply: oneshot::Sender<bool>,
    },
    /// Send one frame to every open session, skipping closed ones.
    Broadcast { message: ServerMessage },
    /// Merge a partial update into a client record.
    UpdateClient {
        connection_id: String,
        patch: ClientPatch,
    },
    GetStatus {
        reply: oneshot::Sender<RegistryStatus>,
    },
    /// Close all sessions and shut the task down.
    Stop,
}

/// Events out of the registry task.
#[derive(Debug)]
pub enum RegistryEvent {
    ServerStarted { addr: String },
    ClientConnected(Client),
    ClientDisconnected { connection_id: String },
    /// A well-formed JSON frame from a device, forwarded as-is. What the
    /// frame means is the receiver's concern, not the transport's.
    DataReceived {
        connection_id: String,
        message: serde_json::Value,
    },
    /// A malformed frame or socket-level failure. The session survives
    /// malformed frames; only socket failures close it.
    Error {
        connection_id: Option<String>,
        message: String,
    },
    StatusChanged(RegistryStatus),
}

/// Point-in-time registry status.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RegistryStatus {
    pub is_active: bool,
    pub clients: Vec<Client>,
    pub uptime_secs: u64,
}

/// Channel pair handed to the registry's owner at startup.
pub type EventReceiver = mpsc::UnboundedReceiver<RegistryEvent>;
