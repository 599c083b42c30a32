//! WebSocket listener and the registry actor behind it.
//!
//! One task owns the session table; per-connection tasks pump their
//! socket and talk to the actor over an internal channel. External
//! callers hold a [`ConnectionRegistry`] handle wrapping the command
//! channel, so registry state is only ever touched from inside the
//! actor loop.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, watch};
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{BridgeError, Result};
use crate::registry::client::{Client, ServerMessage};
use crate::registry::{EventReceiver, RegistryCommand, RegistryEvent, RegistryStatus};

/// Frames from per-connection tasks into the actor.
#[derive(Debug)]
enum SessionMsg {
    Joined {
        connection_id: String,
        ip: Option<String>,
        outbound: mpsc::UnboundedSender<Message>,
    },
    Frame {
        connection_id: String,
        text: String,
    },
    Left {
        connection_id: String,
    },
    Failed {
        connection_id: String,
        reason: String,
    },
}

struct Session {
    client: Client,
    outbound: mpsc::UnboundedSender<Message>,
}

#[derive(Clone)]
struct ListenerState {
    sessions: mpsc::UnboundedSender<SessionMsg>,
}

/// Handle to the registry task. Cloneable; dropping all handles does not
/// stop the task, [`stop`](Self::stop) does.
#[derive(Debug, Clone)]
pub struct ConnectionRegistry {
    commands: mpsc::UnboundedSender<RegistryCommand>,
}

impl ConnectionRegistry {
    /// Bind the listener, spawn the actor, and hand back the handle plus
    /// the event stream. Fails only when the address cannot be bound.
    pub async fn start(addr: SocketAddr) -> Result<(Self, EventReceiver)> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| BridgeError::ServerFailed {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;
        let local_addr = listener.local_addr()?;

        let (session_tx, session_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let app = Router::new()
            .route("/ws", get(ws_handler))
            .layer(CorsLayer::permissive())
            .with_state(ListenerState {
                sessions: session_tx,
            });

        tokio::spawn(serve(listener, app, shutdown_rx));
        tokio::spawn(run_actor(
            session_rx,
            command_rx,
            event_tx.clone(),
            shutdown_tx,
        ));

        info!(addr = %local_addr, "websocket server listening");
        let _ = event_tx.send(RegistryEvent::ServerStarted {
            addr: local_addr.to_string(),
        });
        Ok((Self { commands: command_tx }, event_rx))
    }

    /// Send one frame to one client. Returns whether it was accepted for
    /// delivery; unknown clients and closed sockets yield false, not an
    /// error.
    pub async fn send_data(&self, connection_id: &str, message: ServerMessage) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .commands
            .send(RegistryCommand::SendData {
                connection_id: connection_id.to_string(),
                message,
                reply,
            })
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Send one frame to every open session.
    pub fn broadcast(&self, message: ServerMessage) {
        let _ = self.commands.send(RegistryCommand::Broadcast { message });
    }

    /// Merge a partial update into a client record.
    pub fn update_client(&self, connection_id: &str, patch: crate::registry::ClientPatch) {
        let _ = self.commands.send(RegistryCommand::UpdateClient {
            connection_id: connection_id.to_string(),
            patch,
        });
    }

    /// Current status: activity, connected clients, uptime.
    pub async fn status(&self) -> Result<RegistryStatus> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(RegistryCommand::GetStatus { reply })
            .map_err(|_| BridgeError::Other("registry task is gone".to_string()))?;
        rx.await
            .map_err(|_| BridgeError::Other("registry task is gone".to_string()))
    }

    /// Close all sessions and shut the registry down.
    pub fn stop(&self) {
        let _ = self.commands.send(RegistryCommand::Stop);
    }
}

async fn serve(listener: TcpListener, app: Router, mut shutdown: watch::Receiver<bool>) {
    let service = app.into_make_service_with_connect_info::<SocketAddr>();
    let result = axum::serve(listener, service)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await;
    if let Err(e) = result {
        error!(error = %e, "websocket server exited abnormally");
    }
}

async fn ws_handler(
    State(state): State<ListenerState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    upgrade: WebSocketUpgrade,
) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| {
        let connection_id = format!("ws-{}", Uuid::new_v4());
        pump_socket(socket, connection_id, Some(peer.to_string()), state.sessions)
    })
}

/// Per-connection task: one loop over the socket and the outbound queue.
/// The actor never touches the socket directly.
async fn pump_socket(
    mut socket: WebSocket,
    connection_id: String,
    ip: Option<String>,
    sessions: mpsc::UnboundedSender<SessionMsg>,
) {
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    if sessions
        .send(SessionMsg::Joined {
            connection_id: connection_id.clone(),
            ip,
            outbound: outbound_tx,
        })
        .is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            inbound = socket.recv() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    let _ = sessions.send(SessionMsg::Frame {
                        connection_id: connection_id.clone(),
                        text: text.to_string(),
                    });
                }
                Some(Ok(Message::Close(_))) | None => {
                    let _ = sessions.send(SessionMsg::Left {
                        connection_id: connection_id.clone(),
                    });
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = sessions.send(SessionMsg::Failed {
                        connection_id: connection_id.clone(),
                        reason: e.to_string(),
                    });
                    break;
                }
            },
            queued = outbound_rx.recv() => match queued {
                Some(message) => {
                    if socket.send(message).await.is_err() {
                        let _ = sessions.send(SessionMsg::Left {
                            connection_id: connection_id.clone(),
                        });
                        break;
                    }
                }
                // The actor dropped this session; close politely.
                None => {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            },
        }
    }
}

fn encode(message: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            error!(error = %e, "failed to encode outbound frame");
            None
        }
    }
}

async fn run_actor(
    mut sessions_rx: mpsc::UnboundedReceiver<SessionMsg>,
    mut commands_rx: mpsc::UnboundedReceiver<RegistryCommand>,
    events: mpsc::UnboundedSender<RegistryEvent>,
    shutdown: watch::Sender<bool>,
) {
    let started_at = Instant::now();
    let mut sessions: HashMap<String, Session> = HashMap::new();

    let status = |active: bool, sessions: &HashMap<String, Session>| RegistryStatus {
        is_active: active,
        clients: sessions.values().map(|s| s.client.clone()).collect(),
        uptime_secs: started_at.elapsed().as_secs(),
    };

    loop {
        tokio::select! {
            msg = sessions_rx.recv() => {
                let Some(msg) = msg else { break };
                match msg {
                    SessionMsg::Joined { connection_id, ip, outbound } => {
                        let client = Client::new(connection_id.clone(), ip);
                        info!(client = %connection_id, "client connected");
                        sessions.insert(connection_id, Session {
                            client: client.clone(),
                            outbound,
                        });
                        let _ = events.send(RegistryEvent::ClientConnected(client));
                        let _ = events.send(RegistryEvent::StatusChanged(status(true, &sessions)));
                    }
                    SessionMsg::Frame { connection_id, text } => {
                        // Non-JSON text is reported but never fatal to
                        // the session. Anything parseable goes upward
                        // untouched.
                        match serde_json::from_str::<serde_json::Value>(&text) {
                            Ok(message) => {
                                let _ = events.send(RegistryEvent::DataReceived {
                                    connection_id,
                                    message,
                                });
                            }
                            Err(e) => {
                                let reason = BridgeError::Protocol {
                                    client_id: connection_id.clone(),
                                    reason: e.to_string(),
                                };
                                warn!(client = %connection_id, error = %reason, "bad frame");
                                if let Some(session) = sessions.get(&connection_id) {
                                    if let Some(frame) = encode(&ServerMessage::Error {
                                        message: format!("unparseable frame: {e}"),
                                    }) {
                                        let _ = session.outbound.send(frame);
                                    }
                                }
                                let _ = events.send(RegistryEvent::Error {
                                    connection_id: Some(connection_id),
                                    message: reason.to_string(),
                                });
                            }
                        }
                    }
                    SessionMsg::Left { connection_id } => {
                        if sessions.remove(&connection_id).is_some() {
                            info!(client = %connection_id, "client disconnected");
                            let _ = events.send(RegistryEvent::ClientDisconnected { connection_id });
                            let _ = events.send(RegistryEvent::StatusChanged(status(true, &sessions)));
                        }
                    }
                    SessionMsg::Failed { connection_id, reason } => {
                        warn!(client = %connection_id, reason = %reason, "session failed");
                        let _ = events.send(RegistryEvent::Error {
                            connection_id: Some(connection_id.clone()),
                            message: reason,
                        });
                        if sessions.remove(&connection_id).is_some() {
                            let _ = events.send(RegistryEvent::ClientDisconnected { connection_id });
                            let _ = events.send(RegistryEvent::StatusChanged(status(true, &sessions)));
                        }
                    }
                }
            }
            command = commands_rx.recv() => {
                let Some(command) = command else { break };
                match command {
                    RegistryCommand::SendData { connection_id, message, reply } => {
                        let accepted = sessions
                            .get(&connection_id)
                            .and_then(|session| {
                                encode(&message).map(|frame| session.outbound.send(frame).is_ok())
                            })
                            .unwrap_or(false);
                        if !accepted {
                            debug!(client = %connection_id, "send_data to unreachable client");
                            let _ = events.send(RegistryEvent::Error {
                                connection_id: Some(connection_id),
                                message: "send to unreachable client".to_string(),
                            });
                        }
                        let _ = reply.send(accepted);
                    }
                    RegistryCommand::Broadcast { message } => {
                        if let Some(frame) = encode(&message) {
                            // Sessions whose socket task died are skipped;
                            // their Left message is already in flight.
                            for session in sessions.values() {
                                let _ = session.outbound.send(frame.clone());
                            }
                        }
                    }
                    RegistryCommand::UpdateClient { connection_id, patch } => {
                        match sessions.get_mut(&connection_id) {
                            Some(session) => {
                                patch.apply(&mut session.client);
                                let _ = events.send(RegistryEvent::StatusChanged(status(true, &sessions)));
                            }
                            None => {
                                warn!(client = %connection_id, "update for unknown client");
                            }
                        }
                    }
                    RegistryCommand::GetStatus { reply } => {
                        let _ = reply.send(status(true, &sessions));
                    }
                    RegistryCommand::Stop => {
                        info!(clients = sessions.len(), "registry stopping");
                        // Dropping the outbound senders lets each socket
                        // task close its connection.
                        sessions.clear();
                        let _ = shutdown.send(true);
                        let _ = events.send(RegistryEvent::StatusChanged(RegistryStatus {
                            is_active: false,
                            clients: Vec::new(),
                            uptime_secs: started_at.elapsed().as_secs(),
                        }));
                        break;
                    }
                }
            }
        }
    }
    debug!("registry actor shut down");
}
