//! Batch scheduler
//!
//! Drains the telemetry buffer into [`Batch`]es on two triggers:
//!
//! - **interval**: `interval_ms` after the previous flush (or start-up),
//!   driven by [`BatchScheduler::run`];
//! - **size**: inside [`BatchScheduler::ingest`], the moment the buffer holds
//!   `max_size` vehicles.
//!
//! Both go through the buffer's atomic swap, so a given set of points is
//! flushed exactly once however the triggers race. The batch is sealed and
//! pushed onto an unbounded queue inside that same swap, so the queue order
//! matches the order in which windows were cut. Dispatch happens on another
//! task; the ingesting caller never waits on delivery.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use super::batch::Batch;
use super::buffer::{BufferedPoint, TelemetryBuffer};
use crate::broker::message::TelemetryPoint;
use crate::config::BatchSettings;
use crate::utils::error::IngestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    Interval,
    Size,
    Shutdown,
}

impl FlushTrigger {
    fn as_str(self) -> &'static str {
        match self {
            FlushTrigger::Interval => "interval",
            FlushTrigger::Size => "size",
            FlushTrigger::Shutdown => "shutdown",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatcherStats {
    pub total_batches: u64,
    pub total_points: u64,
    pub pending_vehicles: usize,
    pub in_flight_batches: usize,
}

#[derive(Debug)]
pub struct BatchScheduler {
    settings: BatchSettings,
    buffer: TelemetryBuffer,
    outbox: mpsc::UnboundedSender<Arc<Batch>>,
    last_flush: Mutex<Instant>,
    total_ingested: AtomicU64,
    total_rejected: AtomicU64,
    total_batches: AtomicU64,
    total_points: AtomicU64,
    in_flight: AtomicUsize,
}

impl BatchScheduler {
    /// Creates a scheduler and the receiving end of its batch queue.
    pub fn new(settings: BatchSettings) -> (Self, mpsc::UnboundedReceiver<Arc<Batch>>) {
        let (outbox, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            settings,
            buffer: TelemetryBuffer::new(settings.max_size),
            outbox,
            last_flush: Mutex::new(Instant::now()),
            total_ingested: AtomicU64::new(0),
            total_rejected: AtomicU64::new(0),
            total_batches: AtomicU64::new(0),
            total_points: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
        };
        (scheduler, rx)
    }

    pub fn settings(&self) -> BatchSettings {
        self.settings
    }

    /// Validates and buffers `point`. Reaching `max_size` flushes right here.
    pub fn ingest(&self, point: TelemetryPoint) -> Result<(), IngestError> {
        if let Err(e) = point.validate() {
            self.total_rejected.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(vehicle = %point.vehicle_id, error = %e, "telemetry rejected");
            return Err(e);
        }

        self.total_ingested.fetch_add(1, Ordering::Relaxed);
        let arrived_at = chrono::Utc::now().timestamp_millis();

        // sealing and enqueueing stay under the buffer lock so that batches
        // enter the queue in the order their contents left the buffer
        self.buffer.push_then(point, arrived_at, |drained| {
            self.touch();
            self.emit(drained, FlushTrigger::Size)
        });
        Ok(())
    }

    /// Swaps the buffer out and emits a batch if it held anything.
    pub fn flush(&self, trigger: FlushTrigger) -> Option<Arc<Batch>> {
        self.buffer.take_then(|drained| {
            self.touch();
            self.emit(drained, trigger)
        })
    }

    fn touch(&self) {
        *self
            .last_flush
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn next_deadline(&self) -> Instant {
        *self
            .last_flush
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            + self.settings.interval()
    }

    fn emit(&self, drained: Vec<BufferedPoint>, trigger: FlushTrigger) -> Option<Arc<Batch>> {
        let flushed_at = chrono::Utc::now().timestamp_millis();
        let batch = Arc::new(Batch::seal(drained, flushed_at)?);

        self.total_batches.fetch_add(1, Ordering::Relaxed);
        self.total_points
            .fetch_add(batch.point_count() as u64, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::AcqRel);

        tracing::debug!(
            batch_id = batch.batch_id(),
            points = batch.point_count(),
            trigger = trigger.as_str(),
            "batch flushed"
        );

        if self.outbox.send(Arc::clone(&batch)).is_err() {
            self.in_flight.fetch_sub(1, Ordering::AcqRel);
            tracing::warn!(
                batch_id = batch.batch_id(),
                "dispatch queue closed, batch dropped"
            );
        }
        Some(batch)
    }

    /// Called by the dispatch side once a batch has been fanned out.
    pub fn mark_dispatched(&self) {
        // saturating: never wrap if a caller double-reports
        let _ = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    pub fn total_ingested(&self) -> u64 {
        self.total_ingested.load(Ordering::Relaxed)
    }

    pub fn total_rejected(&self) -> u64 {
        self.total_rejected.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> BatcherStats {
        BatcherStats {
            total_batches: self.total_batches.load(Ordering::Relaxed),
            total_points: self.total_points.load(Ordering::Relaxed),
            pending_vehicles: self.buffer.len(),
            in_flight_batches: self.in_flight.load(Ordering::Acquire),
        }
    }

    /// Interval loop. Runs until `shutdown` flips to `true` (or its sender is
    /// dropped), then performs a last flush so the final window is not lost.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            interval_ms = self.settings.interval_ms,
            max_size = self.settings.max_size,
            "batch scheduler started"
        );

        // the first window is measured from here, not from construction
        self.touch();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let deadline = self.next_deadline();
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    // a size flush may have moved the deadline while we slept
                    if Instant::now() >= self.next_deadline() {
                        self.flush(FlushTrigger::Interval);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        if let Some(batch) = self.flush(FlushTrigger::Shutdown) {
            tracing::info!(points = batch.point_count(), "final window flushed");
        }
        tracing::info!("batch scheduler stopped");
    }
}
