use serde::Serialize;
use uuid::Uuid;

use super::buffer::BufferedPoint;
use crate::broker::message::TelemetryPoint;

/// An immutable set of per-vehicle points produced by one flush.
///
/// `start_time` is the oldest arrival among the flushed points and
/// `end_time` the flush instant, both in epoch millis. Points keep the order
/// in which their vehicles first appeared in the window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Batch {
    batch_id: String,
    created_at: i64,
    start_time: i64,
    end_time: i64,
    point_count: usize,
    points: Vec<TelemetryPoint>,
}

impl Batch {
    /// Seals drained buffer content into a batch. Returns `None` for an
    /// empty drain: empty batches are never emitted.
    pub fn seal(drained: Vec<BufferedPoint>, flushed_at: i64) -> Option<Self> {
        let start_time = drained.iter().map(|b| b.arrived_at).min()?;
        let points: Vec<TelemetryPoint> = drained.into_iter().map(|b| b.point).collect();

        Some(Self {
            batch_id: Uuid::new_v4().to_string(),
            created_at: flushed_at,
            start_time,
            end_time: flushed_at,
            point_count: points.len(),
            points,
        })
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    pub fn end_time(&self) -> i64 {
        self.end_time
    }

    pub fn point_count(&self) -> usize {
        self.point_count
    }

    pub fn points(&self) -> &[TelemetryPoint] {
        &self.points
    }

    pub fn point_for(&self, vehicle_id: &str) -> Option<&TelemetryPoint> {
        self.points.iter().find(|p| p.vehicle_id == vehicle_id)
    }
}
