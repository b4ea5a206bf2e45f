use super::pubsub_client::{
    Client, ConnectionKind, ConnectionRegistry, ConnectionStats, OUTBOUND_QUEUE_CAPACITY,
};
use crate::dispatch::Transport;
use crate::utils::error::DeliveryError;
use tokio::sync::mpsc;
use tungstenite::protocol::Message as WsMessage;

#[test]
fn test_client_new() {
    let (tx, _) = mpsc::channel::<WsMessage>(OUTBOUND_QUEUE_CAPACITY);
    let client = Client::new(tx);
    assert!(client.id.starts_with("conn-"));
    assert_eq!(client.metadata.kind, ConnectionKind::Viewer);
    assert_eq!(client.metadata.connected_at, client.metadata.last_activity);
}

#[test]
fn test_send_reaches_channel() {
    let registry = ConnectionRegistry::new();
    let (tx, mut rx) = mpsc::channel::<WsMessage>(OUTBOUND_QUEUE_CAPACITY);
    let client = Client::new(tx);
    let id = client.id.clone();
    registry.register(client);

    registry.send(&id, "{\"type\":\"stats\"}").unwrap();
    match rx.try_recv().unwrap() {
        WsMessage::Text(text) => assert_eq!(text.as_str(), "{\"type\":\"stats\"}"),
        other => panic!("Expected a text message, got {other:?}"),
    }
}

#[test]
fn test_send_to_removed_handle_fails() {
    let registry = ConnectionRegistry::new();
    let (tx, _rx) = mpsc::channel::<WsMessage>(OUTBOUND_QUEUE_CAPACITY);
    let client = Client::new(tx);
    let id = client.id.clone();
    registry.register(client);

    assert!(registry.remove(&id).is_some());
    assert_eq!(
        registry.send(&id, "x"),
        Err(DeliveryError::UnknownHandle(id.clone()))
    );
    assert!(registry.is_empty());
}

#[test]
fn test_send_to_closed_channel_fails() {
    let registry = ConnectionRegistry::new();
    let (tx, rx) = mpsc::channel::<WsMessage>(OUTBOUND_QUEUE_CAPACITY);
    let client = Client::new(tx);
    let id = client.id.clone();
    registry.register(client);

    // Drop the receiver to close the channel
    drop(rx);
    assert_eq!(
        registry.send(&id, "x"),
        Err(DeliveryError::ChannelClosed(id.clone()))
    );
}

#[test]
fn test_send_to_full_queue_fails_without_blocking() {
    let registry = ConnectionRegistry::new();
    let (tx, mut rx) = mpsc::channel::<WsMessage>(2);
    let client = Client::new(tx);
    let id = client.id.clone();
    registry.register(client);

    registry.send(&id, "a").unwrap();
    registry.send(&id, "b").unwrap();
    assert_eq!(
        registry.send(&id, "c"),
        Err(DeliveryError::QueueFull(id.clone()))
    );

    // the reader catching up frees room again
    rx.try_recv().unwrap();
    assert!(registry.send(&id, "d").is_ok());
}

#[test]
fn test_classify_and_stats() {
    let registry = ConnectionRegistry::new();
    let mut ids = Vec::new();
    for _ in 0..3 {
        let (tx, _) = mpsc::channel::<WsMessage>(OUTBOUND_QUEUE_CAPACITY);
        let client = Client::new(tx);
        ids.push(client.id.clone());
        registry.register(client);
    }

    registry.classify(&ids[0], ConnectionKind::Vehicle);
    assert_eq!(
        registry.stats(),
        ConnectionStats {
            viewers: 2,
            vehicles: 1
        }
    );
    assert_eq!(
        registry.metadata(&ids[0]).unwrap().kind,
        ConnectionKind::Vehicle
    );

    let before = registry.metadata(&ids[1]).unwrap().last_activity;
    registry.touch(&ids[1]);
    assert!(registry.metadata(&ids[1]).unwrap().last_activity >= before);
}
