//! Registry task lifecycle over a real loopback listener.

use deckbridge::registry::{ConnectionRegistry, RegistryEvent, ServerMessage};

#[tokio::test]
async fn start_reports_bound_address() {
    let (_registry, mut events) = ConnectionRegistry::start("127.0.0.1:0".parse().unwrap())
        .await
        .expect("bind loopback");

    match events.recv().await.expect("startup event") {
        RegistryEvent::ServerStarted { addr } => {
            assert!(addr.starts_with("127.0.0.1:"));
            assert!(!addr.ends_with(":0"), "real port resolved");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn status_reflects_empty_registry() {
    let (registry, _events) = ConnectionRegistry::start("127.0.0.1:0".parse().unwrap())
        .await
        .expect("bind loopback");

    let status = registry.status().await.unwrap();
    assert!(status.is_active);
    assert!(status.clients.is_empty());
}

#[tokio::test]
async fn send_to_unknown_client_returns_false() {
    let (registry, _events) = ConnectionRegistry::start("127.0.0.1:0".parse().unwrap())
        .await
        .expect("bind loopback");

    assert!(!registry.send_data("ws-nobody", ServerMessage::Pong).await);
}

#[tokio::test]
async fn stop_closes_the_event_stream() {
    let (registry, mut events) = ConnectionRegistry::start("127.0.0.1:0".parse().unwrap())
        .await
        .expect("bind loopback");

    registry.stop();
    // Drain until the actor drops its sender.
    while events.recv().await.is_some() {}

    // Commands after stop are absorbed, not panics.
    assert!(!registry.send_data("ws-nobody", ServerMessage::Pong).await);
    assert!(registry.status().await.is_err());
}

#[tokio::test]
async fn bind_failure_is_reported() {
    // Binding a port that is already taken fails with a server error.
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let busy_addr = taken.local_addr().unwrap();
    let result = ConnectionRegistry::start(busy_addr).await;
    assert!(result.is_err());
}
