//! Key events flowing through the coordinator into plugin dispatch.

use deckbridge::coordinator::Coordinator;
use deckbridge::dispatch::ChannelDispatcher;
use deckbridge::mapping::{
    default_structure, Action, ActionReference, Key, MappingState, Mode,
};
use deckbridge::registry::{ConnectionRegistry, RegistryEvent};
use serde_json::json;
use tokio::sync::mpsc;

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
    Action {
        id: id.to_string(),
        source: "musicplugin".to_string(),
        version: "1.0.0".to_string(),
        enabled: true,
        value: None,
        icon: None,
        name: None,
        description: None,
    }
}

async fn start_registry() -> ConnectionRegistry {
    let (registry, _events) = ConnectionRegistry::start("127.0.0.1:0".parse().unwrap())
        .await
        .expect("bind loopback");
    registry
}

/// Feed a synthetic event stream into a coordinator and collect what
/// reaches the plugin side.
#[tokio::test]
async fn key_event_dispatches_bound_action() {
    let mut state = MappingState::new(default_structure());
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

    let registry = start_registry().await;
    let (dispatcher, mut deliveries) = ChannelDispatcher::new();
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let coordinator = Coordinator::new(state, registry, dispatcher);
    // No sessions yet; the push is simply absorbed by the registry.
    coordinator.broadcast_profile();
    let task = tokio::spawn(coordinator.run(event_rx));

    event_tx
        .send(RegistryEvent::DataReceived {
            connection_id: "ws-test".to_string(),
            message: json!({"type": "key", "payload": {"id": "PlayKey", "mode": "press"}}),
        })
        .unwrap();

    let (source, payload) = deliveries.recv().await.expect("delivery");
    assert_eq!(source, "musicplugin");
    assert_eq!(payload.action.id, "play");

    drop(event_tx);
    task.await.unwrap();
}

#[tokio::test]
async fn unbound_key_event_is_absorbed() {
    let state = MappingState::new(default_structure());
    let registry = start_registry().await;
    let (dispatcher, mut deliveries) = ChannelDispatcher::new();
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let task = tokio::spawn(Coordinator::new(state, registry, dispatcher).run(event_rx));

    // Unregistered key, a registered key with an unbound mode, and a
    // frame outside the known vocabulary.
    event_tx
        .send(RegistryEvent::DataReceived {
            connection_id: "ws-test".to_string(),
            message: json!({"type": "key", "payload": {"id": "NoSuchKey", "mode": "press"}}),
        })
        .unwrap();
    event_tx
        .send(RegistryEvent::DataReceived {
            connection_id: "ws-test".to_string(),
            message: json!({"type": "key", "payload": {"id": "Enter", "mode": "release"}}),
        })
        .unwrap();
    event_tx
        .send(RegistryEvent::DataReceived {
            connection_id: "ws-test".to_string(),
            message: json!({"type": "firmware_report", "payload": {"rev": 7}}),
        })
        .unwrap();

    drop(event_tx);
    task.await.unwrap();
    assert!(deliveries.try_recv().is_err(), "nothing dispatched");
}

#[tokio::test]
async fn disabled_source_stops_dispatch_until_reenabled() {
    let mut state = MappingState::new(default_structure());
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

    let registry = start_registry().await;
    let (dispatcher, mut deliveries) = ChannelDispatcher::new();
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let task = tokio::spawn(Coordinator::new(state, registry, dispatcher).run(event_rx));
    event_tx
        .send(RegistryEvent::DataReceived {
            connection_id: "ws-test".to_string(),
            message: json!({"type": "key", "payload": {"id": "PlayKey", "mode": "press"}}),
        })
        .unwrap();

    drop(event_tx);
    task.await.unwrap();
    assert!(
        deliveries.try_recv().is_err(),
        "disabled key must not dispatch"
    );
}

#[tokio::test]
async fn direct_action_frame_dispatches() {
    let mut state = MappingState::new(default_structure());
    state.add_action(plugin_action("play")).unwrap();

    let registry = start_registry().await;
    let (dispatcher, mut deliveries) = ChannelDispatcher::new();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(Coordinator::new(state, registry, dispatcher).run(event_rx));

    event_tx
        .send(RegistryEvent::DataReceived {
            connection_id: "ws-test".to_string(),
            message: json!({
                "type": "action",
                "payload": {
                    "kind": "reference",
                    "id": "play",
                    "source": "musicplugin",
                    "value": {"volume": 5},
                    "enabled": true
                }
            }),
        })
        .unwrap();

    let (source, payload) = deliveries.recv().await.expect("delivery");
    assert_eq!(source, "musicplugin");
    assert_eq!(payload.action.value, Some(json!({"volume": 5})));

    drop(event_tx);
    task.await.unwrap();
}
