//! Client representation
//!
//! `Client` models one live WebSocket connection: its handle, the sending
//! side of its outbound channel, and the metadata the transport keeps about
//! it. `ConnectionRegistry` is the table of live clients; it implements the
//! dispatcher's [`Transport`] by pushing text frames onto the matching
//! channel, which a per-connection task drains to the socket. The channel is
//! bounded: a viewer that stops reading loses frames instead of growing the
//! server's memory.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::Sender;
use tokio::sync::mpsc::error::TrySendError;
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use crate::dispatch::Transport;
use crate::utils::error::DeliveryError;

/// Frames a connection may have queued before further sends fail.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    Viewer,
    Vehicle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionMetadata {
    pub connected_at: i64,
    pub kind: ConnectionKind,
    pub last_activity: i64,
}

impl ConnectionMetadata {
    pub fn viewer_now() -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            connected_at: now,
            kind: ConnectionKind::Viewer,
            last_activity: now,
        }
    }
}

#[derive(Debug)]
pub struct Client {
    pub id: String,
    pub sender: Sender<WsMessage>,
    pub metadata: ConnectionMetadata,
}

impl Client {
    /// Create a new client with a sender channel. The `id` is a UUID used
    /// as the subscriber handle across broker operations.
    pub fn new(sender: Sender<WsMessage>) -> Self {
        Self {
            id: format!("conn-{}", Uuid::new_v4()),
            sender,
            metadata: ConnectionMetadata::viewer_now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStats {
    pub viewers: usize,
    pub vehicles: usize,
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    clients: Mutex<HashMap<String, Client>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Client>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, client: Client) {
        tracing::debug!(handle = %client.id, "connection registered");
        self.lock().insert(client.id.clone(), client);
    }

    /// Removes the client. Once this returns, sends to `handle` fail.
    pub fn remove(&self, handle: &str) -> Option<Client> {
        self.lock().remove(handle)
    }

    pub fn contains(&self, handle: &str) -> bool {
        self.lock().contains_key(handle)
    }

    pub fn metadata(&self, handle: &str) -> Option<ConnectionMetadata> {
        self.lock().get(handle).map(|c| c.metadata.clone())
    }

    /// Refreshes `last_activity` for `handle`.
    pub fn touch(&self, handle: &str) {
        if let Some(client) = self.lock().get_mut(handle) {
            client.metadata.last_activity = chrono::Utc::now().timestamp_millis();
        }
    }

    /// Marks `handle` as a telemetry source.
    pub fn classify(&self, handle: &str, kind: ConnectionKind) {
        if let Some(client) = self.lock().get_mut(handle) {
            if client.metadata.kind != kind {
                tracing::info!(handle, kind = ?kind, "connection reclassified");
                client.metadata.kind = kind;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> ConnectionStats {
        self.lock()
            .values()
            .fold(ConnectionStats::default(), |mut acc, c| {
                match c.metadata.kind {
                    ConnectionKind::Viewer => acc.viewers += 1,
                    ConnectionKind::Vehicle => acc.vehicles += 1,
                }
                acc
            })
    }
}

impl Transport for ConnectionRegistry {
    fn send(&self, handle: &str, payload: &str) -> Result<(), DeliveryError> {
        let clients = self.lock();
        let client = clients
            .get(handle)
            .ok_or_else(|| DeliveryError::UnknownHandle(handle.to_string()))?;
        client
            .sender
            .try_send(WsMessage::text(payload.to_string()))
            .map_err(|e| match e {
                TrySendError::Full(_) => DeliveryError::QueueFull(handle.to_string()),
                TrySendError::Closed(_) => DeliveryError::ChannelClosed(handle.to_string()),
            })
    }
}
