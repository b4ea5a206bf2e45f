//! Wire protocol
//!
//! JSON messages exchanged over the WebSocket, tagged by `"type"`. Decoding
//! happens here and only here; the broker works with the typed values.

use serde::{Deserialize, Serialize};

use crate::batcher::Batch;
use crate::broker::message::{TelemetryPoint, TripEvent};
use crate::broker::topic::TopicKind;
use crate::stats::StatsSnapshot;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "subscribe_vehicle")]
    SubscribeVehicle { vehicle_id: String },
    #[serde(rename = "unsubscribe_vehicle")]
    UnsubscribeVehicle { vehicle_id: String },
    #[serde(rename = "subscribe_route")]
    SubscribeRoute { route_id: String },
    #[serde(rename = "unsubscribe_route")]
    UnsubscribeRoute { route_id: String },
    #[serde(rename = "telemetry")]
    Telemetry { point: TelemetryPoint },
    #[serde(rename = "trip_event")]
    TripEvent { event: TripEvent },
    #[serde(rename = "stats")]
    Stats {},
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// One subscriber's share of a flushed batch.
    #[serde(rename = "batch")]
    Batch {
        batch_id: String,
        start_time: i64,
        end_time: i64,
        point_count: usize,
        points: Vec<TelemetryPoint>,
    },
    #[serde(rename = "trip_event")]
    TripEvent { event: TripEvent },
    #[serde(rename = "subscribed")]
    Subscribed {
        kind: TopicKind,
        topic: String,
        created: bool,
    },
    #[serde(rename = "unsubscribed")]
    Unsubscribed {
        kind: TopicKind,
        topic: String,
        removed: bool,
    },
    #[serde(rename = "stats")]
    Stats { snapshot: StatsSnapshot },
    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerMessage {
    /// The part of `batch` made of `points`, keeping the batch's id and window.
    pub fn batch_slice(batch: &Batch, points: Vec<TelemetryPoint>) -> Self {
        ServerMessage::Batch {
            batch_id: batch.batch_id().to_string(),
            start_time: batch.start_time(),
            end_time: batch.end_time(),
            point_count: points.len(),
            points,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
