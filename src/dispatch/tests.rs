use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use super::{DispatchReport, Dispatcher, Transport};
use crate::batcher::{Batch, BufferedPoint};
use crate::broker::message::{TelemetryPoint, TripEvent, TripEventKind};
use crate::broker::topic::{TopicKind, TopicRegistry};
use crate::transport::message::ServerMessage;
use crate::utils::error::DeliveryError;

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<(String, String)>>,
    broken: HashSet<String>,
}

impl RecordingTransport {
    fn with_broken(handles: &[&str]) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            broken: handles.iter().map(|h| h.to_string()).collect(),
        }
    }

    fn received_by(&self, handle: &str) -> Vec<ServerMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(h, _)| h == handle)
            .map(|(_, payload)| serde_json::from_str(payload).unwrap())
            .collect()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, handle: &str, payload: &str) -> Result<(), DeliveryError> {
        if self.broken.contains(handle) {
            return Err(DeliveryError::ChannelClosed(handle.to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((handle.to_string(), payload.to_string()));
        Ok(())
    }
}

struct Fixture {
    vehicles: Arc<TopicRegistry>,
    routes: Arc<TopicRegistry>,
    transport: Arc<RecordingTransport>,
    dispatcher: Dispatcher,
}

fn fixture(transport: RecordingTransport) -> Fixture {
    let vehicles = Arc::new(TopicRegistry::new(TopicKind::Vehicle));
    let routes = Arc::new(TopicRegistry::new(TopicKind::Route));
    let transport = Arc::new(transport);
    let dispatcher = Dispatcher::new(vehicles.clone(), routes.clone(), transport.clone());
    Fixture {
        vehicles,
        routes,
        transport,
        dispatcher,
    }
}

fn batch_of(vehicles: &[&str]) -> Batch {
    let drained = vehicles
        .iter()
        .enumerate()
        .map(|(i, v)| BufferedPoint::new(TelemetryPoint::new(v, 0, 1.0, 2.0), i as i64))
        .collect();
    Batch::seal(drained, 100).unwrap()
}

fn vehicles_in(message: &ServerMessage) -> Vec<String> {
    match message {
        ServerMessage::Batch { points, .. } => {
            points.iter().map(|p| p.vehicle_id.clone()).collect()
        }
        other => panic!("Expected a batch, got {other:?}"),
    }
}

fn trip_event(route: &str) -> TripEvent {
    TripEvent {
        kind: TripEventKind::TripStarted,
        route_id: route.to_string(),
        vehicle_id: "bus-7".to_string(),
        driver_id: "d-1".to_string(),
        trip_id: "t-1".to_string(),
        timestamp: 1_700_000_000_000,
    }
}

#[test]
fn test_batch_is_filtered_per_subscriber() {
    let f = fixture(RecordingTransport::default());
    f.vehicles.subscribe("A", "x");
    f.vehicles.subscribe("A", "y");
    f.vehicles.subscribe("B", "y");

    let batch = batch_of(&["A", "B"]);
    let report = f.dispatcher.dispatch_batch(&batch);
    assert_eq!(
        report,
        DispatchReport {
            recipients: 2,
            delivered: 2,
            failed: 0
        }
    );

    let to_x = f.transport.received_by("x");
    assert_eq!(to_x.len(), 1);
    assert_eq!(vehicles_in(&to_x[0]), vec!["A"]);

    let to_y = f.transport.received_by("y");
    assert_eq!(to_y.len(), 1);
    assert_eq!(vehicles_in(&to_y[0]), vec!["A", "B"]);

    match &to_y[0] {
        ServerMessage::Batch {
            batch_id,
            point_count,
            start_time,
            end_time,
            ..
        } => {
            assert_eq!(batch_id, batch.batch_id());
            assert_eq!(*point_count, 2);
            assert_eq!(*start_time, batch.start_time());
            assert_eq!(*end_time, batch.end_time());
        }
        other => panic!("Expected a batch, got {other:?}"),
    }
}

#[test]
fn test_batch_without_subscribers_sends_nothing() {
    let f = fixture(RecordingTransport::default());
    f.vehicles.subscribe("C", "x");

    let report = f.dispatcher.dispatch_batch(&batch_of(&["A", "B"]));
    assert_eq!(report.recipients, 0);
    assert!(f.transport.sent.lock().unwrap().is_empty());
    assert_eq!(f.dispatcher.stats().batches_dispatched, 1);
}

#[test]
fn test_failed_delivery_does_not_stop_others() {
    let f = fixture(RecordingTransport::with_broken(&["gone"]));
    for handle in ["a", "gone", "b"] {
        f.vehicles.subscribe("V1", handle);
    }

    let report = f.dispatcher.dispatch_batch(&batch_of(&["V1"]));
    assert_eq!(report.recipients, 3);
    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(f.transport.received_by("a").len(), 1);
    assert_eq!(f.transport.received_by("b").len(), 1);

    let stats = f.dispatcher.stats();
    assert_eq!(stats.deliveries, 2);
    assert_eq!(stats.delivery_failures, 1);
}

#[test]
fn test_trip_event_goes_to_route_subscribers_verbatim() {
    let f = fixture(RecordingTransport::default());
    f.routes.subscribe("route-12", "x");
    f.routes.subscribe("route-99", "y");
    // a vehicle subscription on the same id must not matter
    f.vehicles.subscribe("route-12", "z");

    let event = trip_event("route-12");
    let report = f.dispatcher.dispatch_trip_event(&event);
    assert_eq!(report.recipients, 1);
    assert_eq!(report.delivered, 1);

    assert_eq!(
        f.transport.received_by("x"),
        vec![ServerMessage::TripEvent {
            event: event.clone()
        }]
    );
    assert!(f.transport.received_by("y").is_empty());
    assert!(f.transport.received_by("z").is_empty());
    assert_eq!(f.dispatcher.stats().trip_events_dispatched, 1);
}

#[test]
fn test_trip_event_for_unknown_route() {
    let f = fixture(RecordingTransport::default());
    let report = f.dispatcher.dispatch_trip_event(&trip_event("nowhere"));
    assert_eq!(report, DispatchReport::default());
}
