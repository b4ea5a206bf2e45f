//! Fan-out dispatcher
//!
//! Resolves who is interested in a batch or trip event and hands each
//! recipient its payload through the [`Transport`]. Batches are filtered per
//! subscriber: a handle only receives the points of vehicles it follows.
//!
//! Delivery is best effort. A failed send is logged and counted, the
//! remaining recipients are still served, and nothing is retried since the
//! next flush supersedes the missed batch. No registry lock is held while
//! sending.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::batcher::Batch;
use crate::broker::message::{TelemetryPoint, TripEvent};
use crate::broker::topic::{SubscriberId, TopicRegistry};
use crate::transport::message::ServerMessage;
use crate::utils::error::DeliveryError;

/// The delivery primitive offered by the transport layer.
pub trait Transport: Send + Sync {
    /// Queues `payload` (encoded JSON) for `handle`. Must not block.
    fn send(&self, handle: &str, payload: &str) -> Result<(), DeliveryError>;
}

/// Outcome of one dispatch call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub recipients: usize,
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub batches_dispatched: u64,
    pub trip_events_dispatched: u64,
    pub deliveries: u64,
    pub delivery_failures: u64,
}

pub struct Dispatcher {
    vehicles: Arc<TopicRegistry>,
    routes: Arc<TopicRegistry>,
    transport: Arc<dyn Transport>,
    batches_dispatched: AtomicU64,
    trip_events_dispatched: AtomicU64,
    deliveries: AtomicU64,
    delivery_failures: AtomicU64,
}

impl Dispatcher {
    pub fn new(
        vehicles: Arc<TopicRegistry>,
        routes: Arc<TopicRegistry>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            vehicles,
            routes,
            transport,
            batches_dispatched: AtomicU64::new(0),
            trip_events_dispatched: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
        }
    }

    /// Sends every subscriber the slice of `batch` covering the vehicles it
    /// follows, in batch order.
    pub fn dispatch_batch(&self, batch: &Batch) -> DispatchReport {
        let mut slices: HashMap<SubscriberId, Vec<TelemetryPoint>> = HashMap::new();
        for point in batch.points() {
            for handle in self.vehicles.subscribers_of(&point.vehicle_id) {
                slices.entry(handle).or_default().push(point.clone());
            }
        }

        let mut report = DispatchReport {
            recipients: slices.len(),
            ..Default::default()
        };

        for (handle, points) in slices {
            let message = ServerMessage::batch_slice(batch, points);
            match message.to_json() {
                Ok(payload) => self.deliver(&handle, &payload, &mut report),
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(batch_id = batch.batch_id(), error = %e, "failed to encode batch");
                }
            }
        }

        self.batches_dispatched.fetch_add(1, Ordering::Relaxed);
        self.record(&report);
        tracing::debug!(
            batch_id = batch.batch_id(),
            points = batch.point_count(),
            recipients = report.recipients,
            failed = report.failed,
            "batch dispatched"
        );
        report
    }

    /// Sends `event` unchanged to every subscriber of its route.
    pub fn dispatch_trip_event(&self, event: &TripEvent) -> DispatchReport {
        let recipients = self.routes.subscribers_of(&event.route_id);
        let mut report = DispatchReport {
            recipients: recipients.len(),
            ..Default::default()
        };

        if !recipients.is_empty() {
            let message = ServerMessage::TripEvent {
                event: event.clone(),
            };
            match message.to_json() {
                Ok(payload) => {
                    for handle in &recipients {
                        self.deliver(handle, &payload, &mut report);
                    }
                }
                Err(e) => {
                    report.failed = recipients.len();
                    tracing::error!(trip_id = %event.trip_id, error = %e, "failed to encode trip event");
                }
            }
        }

        self.trip_events_dispatched.fetch_add(1, Ordering::Relaxed);
        self.record(&report);
        tracing::debug!(
            route = %event.route_id,
            trip_id = %event.trip_id,
            recipients = report.recipients,
            "trip event dispatched"
        );
        report
    }

    fn deliver(&self, handle: &str, payload: &str, report: &mut DispatchReport) {
        match self.transport.send(handle, payload) {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                report.failed += 1;
                tracing::warn!(handle, error = %e, "delivery failed");
            }
        }
    }

    fn record(&self, report: &DispatchReport) {
        self.deliveries
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.delivery_failures
            .fetch_add(report.failed as u64, Ordering::Relaxed);
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            batches_dispatched: self.batches_dispatched.load(Ordering::Relaxed),
            trip_events_dispatched: self.trip_events_dispatched.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
        }
    }
}
