//! WebSocket transport
//!
//! Accepts connections and translates protocol JSON into broker calls:
//! - every connection becomes a `Client` registered with the `Broker`; its
//!   outbound channel is drained into the socket by a dedicated task
//! - text frames are decoded as [`ClientMessage`] and applied
//! - on close (or read error) the connection and all of its subscriptions
//!   are removed before the task exits

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tungstenite::protocol::Message as WsMessage;

use crate::broker::{Broker, TopicKind};
use crate::client::{Client, ConnectionKind, OUTBOUND_QUEUE_CAPACITY};
use crate::transport::message::{ClientMessage, ServerMessage};
use crate::utils::error::TransportError;

/// Binds `addr` and serves until the listener fails.
pub async fn start_websocket_server(addr: &str, broker: Arc<Broker>) -> Result<(), TransportError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| TransportError::Bind {
            addr: addr.to_string(),
            source,
        })?;
    serve(listener, broker).await
}

/// Serves connections from an already-bound listener.
pub async fn serve(listener: TcpListener, broker: Arc<Broker>) -> Result<(), TransportError> {
    let local = listener.local_addr()?;
    tracing::info!("WebSocket server listening on ws://{local}");

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tokio::spawn(handle_connection(stream, peer, broker.clone()));
            }
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, broker: Arc<Broker>) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::warn!(%peer, error = %e, "WebSocket handshake error");
            return;
        }
    };

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::channel::<WsMessage>(OUTBOUND_QUEUE_CAPACITY);
    let client = Client::new(tx.clone());
    let handle = client.id.clone();
    broker.on_connect(client);

    let send_loop = {
        let handle = handle.clone();
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = ws_sender.send(msg).await {
                    tracing::debug!(%handle, error = %e, "failed to write to socket");
                    break;
                }
            }
            tracing::debug!(%handle, "send loop closed");
        })
    };

    while let Some(frame) = ws_receiver.next().await {
        let msg = match frame {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(%handle, error = %e, "read error");
                break;
            }
        };

        match msg {
            WsMessage::Text(text) => {
                broker.connections().touch(&handle);
                let reply = match serde_json::from_str::<ClientMessage>(text.as_str()) {
                    Ok(request) => handle_request(&broker, &handle, request),
                    Err(e) => {
                        tracing::warn!(%handle, error = %e, "invalid client message");
                        Some(ServerMessage::error(format!("invalid message: {e}")))
                    }
                };
                if let Some(reply) = reply {
                    reply_to(&tx, &handle, &reply);
                }
            }
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    broker.on_disconnect(&handle);
    drop(tx);
    if let Err(e) = send_loop.await {
        tracing::error!(%handle, error = %e, "send loop panicked");
    }
}

/// Applies one decoded request on behalf of `handle` and returns the direct
/// reply, if the request has one.
pub(crate) fn handle_request(
    broker: &Broker,
    handle: &str,
    request: ClientMessage,
) -> Option<ServerMessage> {
    match request {
        ClientMessage::SubscribeVehicle { vehicle_id } => {
            Some(subscribed(broker, TopicKind::Vehicle, vehicle_id, handle))
        }
        ClientMessage::UnsubscribeVehicle { vehicle_id } => {
            Some(unsubscribed(broker, TopicKind::Vehicle, vehicle_id, handle))
        }
        ClientMessage::SubscribeRoute { route_id } => {
            Some(subscribed(broker, TopicKind::Route, route_id, handle))
        }
        ClientMessage::UnsubscribeRoute { route_id } => {
            Some(unsubscribed(broker, TopicKind::Route, route_id, handle))
        }
        ClientMessage::Telemetry { point } => match broker.ingest_from(handle, point) {
            Ok(()) => None,
            Err(e) => Some(ServerMessage::error(e.to_string())),
        },
        ClientMessage::TripEvent { event } => {
            broker.connections().classify(handle, ConnectionKind::Vehicle);
            let report = broker.emit_trip_event(&event);
            tracing::debug!(
                %handle,
                route = %event.route_id,
                delivered = report.delivered,
                "trip event relayed"
            );
            None
        }
        ClientMessage::Stats {} => Some(ServerMessage::Stats {
            snapshot: broker.stats(),
        }),
    }
}

fn subscribed(broker: &Broker, kind: TopicKind, topic: String, handle: &str) -> ServerMessage {
    let created = broker.subscribe(kind, &topic, handle);
    tracing::debug!(%handle, kind = kind.as_str(), %topic, created, "subscribed");
    ServerMessage::Subscribed {
        kind,
        topic,
        created,
    }
}

fn unsubscribed(broker: &Broker, kind: TopicKind, topic: String, handle: &str) -> ServerMessage {
    let removed = broker.unsubscribe(kind, &topic, handle);
    tracing::debug!(%handle, kind = kind.as_str(), %topic, removed, "unsubscribed");
    ServerMessage::Unsubscribed {
        kind,
        topic,
        removed,
    }
}

fn reply_to(tx: &mpsc::Sender<WsMessage>, handle: &str, reply: &ServerMessage) {
    match reply.to_json() {
        Ok(json) => {
            if let Err(e) = tx.try_send(WsMessage::text(json)) {
                tracing::warn!(%handle, error = %e, "reply dropped");
            }
        }
        Err(e) => tracing::error!(%handle, error = %e, "failed to encode reply"),
    }
}
