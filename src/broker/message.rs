//! Telemetry and trip event definitions
//!
//! `TelemetryPoint` is the unit the buffer coalesces and the batcher ships.
//! Optional context (trip, route, driver) and GPS quality fields are `Option`
//! so that "not reported" stays distinct from a reported zero, and they are
//! left out of the JSON encoding when absent.
//!
//! `TripEvent` is never buffered: it is routed by `route_id` straight to the
//! dispatcher.

use serde::{Deserialize, Serialize};

use crate::utils::error::IngestError;

pub type VehicleId = String;
pub type RouteId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPoint {
    pub vehicle_id: VehicleId,
    /// Milliseconds since UNIX epoch, as reported by the source.
    pub timestamp: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
    pub bearing: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_id: Option<RouteId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub satellites: Option<u8>,
}

impl TelemetryPoint {
    /// A point with only the required fields set.
    pub fn new(vehicle_id: &str, timestamp: i64, latitude: f64, longitude: f64) -> Self {
        Self {
            vehicle_id: vehicle_id.to_string(),
            timestamp,
            latitude,
            longitude,
            speed: 0.0,
            bearing: 0.0,
            trip_id: None,
            route_id: None,
            driver_id: None,
            altitude: None,
            accuracy: None,
            satellites: None,
        }
    }

    /// Rejects points the buffer must never hold. Geographic range is the
    /// caller's business; only structural problems are checked here.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.vehicle_id.trim().is_empty() {
            return Err(IngestError::MissingVehicleId);
        }

        let required = [
            ("latitude", self.latitude),
            ("longitude", self.longitude),
            ("speed", self.speed),
            ("bearing", self.bearing),
        ];
        for (field, value) in required {
            if !value.is_finite() {
                return Err(IngestError::NonFinite { field, value });
            }
        }

        let optional = [("altitude", self.altitude), ("accuracy", self.accuracy)];
        for (field, value) in optional {
            if let Some(value) = value.filter(|v| !v.is_finite()) {
                return Err(IngestError::NonFinite { field, value });
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripEventKind {
    TripStarted,
    TripEnded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripEvent {
    pub kind: TripEventKind,
    pub route_id: RouteId,
    pub vehicle_id: VehicleId,
    pub driver_id: String,
    pub trip_id: String,
    pub timestamp: i64,
}
