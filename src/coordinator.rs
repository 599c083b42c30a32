//! Glue between the connection registry and the routing engine.
//!
//! The coordinator owns the [`MappingState`] and drains the registry's
//! event stream: key events resolve against the active profile and
//! dispatch to plugins, newly connected clients receive the active
//! profile, and every failure is absorbed here with a log line rather
//! than propagated to the session.

use tracing::{debug, info, warn};

use crate::dispatch::Dispatcher;
use crate::error::BridgeError;
use crate::mapping::schema::ActionPayload;
use crate::mapping::MappingState;
use crate::registry::{
    ConnectionRegistry, DeviceMessage, EventReceiver, KeyEvent, RegistryEvent, ServerMessage,
};

pub struct Coordinator<D: Dispatcher> {
    state: MappingState,
    registry: ConnectionRegistry,
    dispatcher: D,
}

impl<D: Dispatcher> Coordinator<D> {
    pub fn new(state: MappingState, registry: ConnectionRegistry, dispatcher: D) -> Self {
        Self {
            state,
            registry,
            dispatcher,
        }
    }

    /// Drain registry events until the stream closes (registry stop).
    pub async fn run(mut self, mut events: EventReceiver) {
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        info!("event stream closed, coordinator exiting");
    }

    async fn handle_event(&mut self, event: RegistryEvent) {
        match event {
            RegistryEvent::ServerStarted { addr } => {
                info!(addr = %addr, "serving device connections");
            }
            RegistryEvent::ClientConnected(client) => {
                let profile = self.state.current_profile().clone();
                let delivered = self
                    .registry
                    .send_data(&client.connection_id, ServerMessage::Profile { payload: profile })
                    .await;
                if !delivered {
                    warn!(client = %client.connection_id, "could not push profile to new client");
                }
            }
            RegistryEvent::ClientDisconnected { connection_id } => {
                debug!(client = %connection_id, "client gone");
            }
            RegistryEvent::DataReceived {
                connection_id,
                message,
            } => self.handle_frame(&connection_id, message).await,
            RegistryEvent::Error {
                connection_id,
                message,
            } => {
                warn!(client = ?connection_id, error = %message, "registry error");
            }
            RegistryEvent::StatusChanged(status) => {
                debug!(clients = status.clients.len(), active = status.is_active, "registry status");
            }
        }
    }

    /// The transport forwards every JSON frame untouched; frames outside
    /// the known vocabulary are dropped here with a log line.
    async fn handle_frame(&mut self, connection_id: &str, frame: serde_json::Value) {
        match serde_json::from_value::<DeviceMessage>(frame) {
            Ok(message) => self.handle_message(connection_id, message).await,
            Err(e) => {
                debug!(client = %connection_id, error = %e, "unrecognized frame, ignored");
            }
        }
    }

    async fn handle_message(&mut self, connection_id: &str, message: DeviceMessage) {
        match message {
            DeviceMessage::Key { payload } => self.handle_key(connection_id, payload),
            DeviceMessage::Action { payload } => {
                if let Err(e) = self.state.run_action(payload, &self.dispatcher) {
                    log_dispatch_failure(connection_id, &e);
                }
            }
            DeviceMessage::Identify { payload } => {
                self.registry.update_client(connection_id, payload);
            }
            DeviceMessage::Ping => {
                let _ = self
                    .registry
                    .send_data(connection_id, ServerMessage::Pong)
                    .await;
            }
        }
    }

    fn handle_key(&mut self, connection_id: &str, event: KeyEvent) {
        let Some(key) = self.state.get_key(&event.id) else {
            debug!(client = %connection_id, key = %event.id, "event for unregistered key");
            return;
        };
        if !key.enabled {
            debug!(client = %connection_id, key = %event.id, "event for disabled key");
            return;
        }
        let Some(reference) = self.state.resolve_binding(&event.id, event.mode) else {
            debug!(
                client = %connection_id,
                key = %event.id,
                mode = event.mode.as_str(),
                "no binding in active profile"
            );
            return;
        };
        let payload = ActionPayload::Reference(reference.clone());
        if let Err(e) = self.state.run_action(payload, &self.dispatcher) {
            log_dispatch_failure(connection_id, &e);
        }
    }

    /// Push the active profile to every connected device. Called after
    /// configuration changes.
    pub fn broadcast_profile(&self) {
        let profile = self.state.current_profile().clone();
        self.registry
            .broadcast(ServerMessage::Profile { payload: profile });
    }
}

fn log_dispatch_failure(connection_id: &str, error: &BridgeError) {
    match error {
        BridgeError::DispatchSkipped { id, reason } => {
            debug!(client = %connection_id, action = %id, reason = %reason, "dispatch skipped");
        }
        other => {
            warn!(client = %connection_id, error = %other, "dispatch failed");
        }
    }
}
