//! Latest-wins telemetry buffer
//!
//! Holds at most one point per vehicle. A newer arrival replaces the older
//! point in place, so a vehicle keeps the position of its first arrival in
//! the current window. Arrival order decides what is "newer"; the embedded
//! timestamp is ignored because sources may have skewed clocks.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::broker::message::{TelemetryPoint, VehicleId};

#[derive(Debug, Clone, PartialEq)]
pub struct BufferedPoint {
    pub point: TelemetryPoint,
    /// Epoch millis at which the point was accepted.
    pub arrived_at: i64,
}

impl BufferedPoint {
    pub fn new(point: TelemetryPoint, arrived_at: i64) -> Self {
        Self { point, arrived_at }
    }
}

#[derive(Debug, Default)]
struct Slots {
    points: Vec<BufferedPoint>,
    index: HashMap<VehicleId, usize>,
}

impl Slots {
    fn len(&self) -> usize {
        self.points.len()
    }
}

#[derive(Debug)]
pub struct TelemetryBuffer {
    capacity: usize,
    slots: Mutex<Slots>,
}

impl TelemetryBuffer {
    /// `capacity` is the vehicle count at which [`push`](Self::push) drains
    /// the buffer on its own.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            slots: Mutex::new(Slots::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `point` as the latest for its vehicle.
    ///
    /// If that brings the buffer to capacity, the whole content is swapped
    /// out within the same critical section and returned, leaving an empty
    /// buffer for the next arrival.
    pub fn push(&self, point: TelemetryPoint, arrived_at: i64) -> Option<Vec<BufferedPoint>> {
        self.push_then(point, arrived_at, |drained| drained)
    }

    /// Like [`push`](Self::push), but hands a capacity drain to `on_full`
    /// before the lock is released. Drains therefore reach `on_full` in the
    /// same order as they left the buffer.
    pub fn push_then<R>(
        &self,
        point: TelemetryPoint,
        arrived_at: i64,
        on_full: impl FnOnce(Vec<BufferedPoint>) -> R,
    ) -> Option<R> {
        let mut slots = self.lock();
        let entry = BufferedPoint::new(point, arrived_at);

        match slots.index.get(&entry.point.vehicle_id).copied() {
            Some(pos) => slots.points[pos] = entry,
            None => {
                let pos = slots.points.len();
                slots.index.insert(entry.point.vehicle_id.clone(), pos);
                slots.points.push(entry);
            }
        }

        if slots.len() >= self.capacity {
            let drained = std::mem::take(&mut *slots).points;
            Some(on_full(drained))
        } else {
            None
        }
    }

    /// Swaps the content out for an empty buffer.
    pub fn take(&self) -> Vec<BufferedPoint> {
        self.take_then(|drained| drained)
    }

    /// Swaps the content out and hands it to `f` before the lock is
    /// released. `f` must not block or touch the buffer.
    pub fn take_then<R>(&self, f: impl FnOnce(Vec<BufferedPoint>) -> R) -> R {
        let mut slots = self.lock();
        let drained = std::mem::take(&mut *slots).points;
        f(drained)
    }

    /// Number of vehicles currently waiting.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
