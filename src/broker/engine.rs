//! Broker engine
//!
//! The `Broker` is the one object the transport talks to. It owns:
//! - the vehicle and route topic registries
//! - the connection table (the delivery endpoint for outbound payloads)
//! - the batch scheduler that coalesces telemetry
//! - the dispatcher that fans batches and trip events out
//! - the stats aggregator
//!
//! Lifecycle: construct with [`Broker::new`], call [`Broker::start`] once
//! inside a tokio runtime to spawn the interval and dispatch tasks, and
//! [`Broker::shutdown`] to stop them after a final flush. All other methods
//! are synchronous, in-memory and safe to call from any connection task;
//! none of them holds a lock across an await point or a send.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::batcher::{Batch, BatchScheduler};
use crate::broker::message::{TelemetryPoint, TripEvent};
use crate::broker::topic::{TopicKind, TopicRegistry};
use crate::client::{Client, ConnectionKind, ConnectionRegistry};
use crate::config::BatchSettings;
use crate::dispatch::{DispatchReport, Dispatcher, Transport};
use crate::stats::{StatsAggregator, StatsSnapshot};
use crate::utils::error::IngestError;

/// Topics a handle was subscribed to when it was removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovedSubscriptions {
    pub vehicles: Vec<String>,
    pub routes: Vec<String>,
}

impl RemovedSubscriptions {
    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty() && self.routes.is_empty()
    }
}

#[derive(Default)]
struct Tasks {
    scheduler: Option<JoinHandle<()>>,
    dispatch: Option<JoinHandle<()>>,
}

pub struct Broker {
    vehicles: Arc<TopicRegistry>,
    routes: Arc<TopicRegistry>,
    connections: Arc<ConnectionRegistry>,
    scheduler: Arc<BatchScheduler>,
    dispatcher: Arc<Dispatcher>,
    stats: StatsAggregator,
    batches: Mutex<Option<mpsc::UnboundedReceiver<Arc<Batch>>>>,
    stop_scheduler: watch::Sender<bool>,
    stop_dispatch: watch::Sender<bool>,
    tasks: Mutex<Tasks>,
}

impl Broker {
    /// A broker delivering through its own connection table.
    pub fn new(settings: BatchSettings) -> Self {
        let connections = Arc::new(ConnectionRegistry::new());
        Self::assemble(settings, connections.clone(), connections)
    }

    /// A broker delivering through `transport` instead of the connection
    /// table. Connection metadata is still tracked.
    pub fn with_transport(settings: BatchSettings, transport: Arc<dyn Transport>) -> Self {
        Self::assemble(settings, Arc::new(ConnectionRegistry::new()), transport)
    }

    fn assemble(
        settings: BatchSettings,
        connections: Arc<ConnectionRegistry>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let vehicles = Arc::new(TopicRegistry::new(TopicKind::Vehicle));
        let routes = Arc::new(TopicRegistry::new(TopicKind::Route));
        let (scheduler, batches) = BatchScheduler::new(settings);
        let scheduler = Arc::new(scheduler);
        let dispatcher = Arc::new(Dispatcher::new(
            vehicles.clone(),
            routes.clone(),
            transport,
        ));
        let stats = StatsAggregator::new(
            scheduler.clone(),
            vehicles.clone(),
            routes.clone(),
            dispatcher.clone(),
            connections.clone(),
        );

        Self {
            vehicles,
            routes,
            connections,
            scheduler,
            dispatcher,
            stats,
            batches: Mutex::new(Some(batches)),
            stop_scheduler: watch::channel(false).0,
            stop_dispatch: watch::channel(false).0,
            tasks: Mutex::new(Tasks::default()),
        }
    }

    /// Spawns the interval and dispatch tasks. Calling it again is a no-op.
    pub fn start(&self) {
        let Some(mut batches) = self
            .batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            tracing::warn!("broker already started");
            return;
        };

        let scheduler_task = tokio::spawn(
            Arc::clone(&self.scheduler).run(self.stop_scheduler.subscribe()),
        );

        let dispatcher = Arc::clone(&self.dispatcher);
        let scheduler = Arc::clone(&self.scheduler);
        let mut stop = self.stop_dispatch.subscribe();
        let dispatch_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    batch = batches.recv() => match batch {
                        Some(batch) => {
                            dispatcher.dispatch_batch(&batch);
                            scheduler.mark_dispatched();
                        }
                        None => break,
                    },
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }

            // deliver whatever was queued before the stop, then exit
            while let Ok(batch) = batches.try_recv() {
                dispatcher.dispatch_batch(&batch);
                scheduler.mark_dispatched();
            }
            tracing::info!("dispatch loop stopped");
        });

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.scheduler = Some(scheduler_task);
        tasks.dispatch = Some(dispatch_task);
        tracing::info!("broker started");
    }

    /// Stops the interval task (which flushes a final non-empty window),
    /// then lets the dispatch task drain its queue and exit.
    pub async fn shutdown(&self) {
        let Tasks {
            scheduler,
            dispatch,
        } = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));

        self.stop_scheduler.send_replace(true);
        if let Some(task) = scheduler {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "scheduler task failed");
            }
        }

        self.stop_dispatch.send_replace(true);
        if let Some(task) = dispatch {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "dispatch task failed");
            }
        }
        tracing::info!("broker stopped");
    }

    /// Registers a new connection.
    pub fn on_connect(&self, client: Client) {
        tracing::info!(handle = %client.id, kind = ?client.metadata.kind, "client connected");
        self.connections.register(client);
    }

    /// Forgets a connection and every subscription it held. Nothing is
    /// delivered to `handle` once this returns.
    pub fn on_disconnect(&self, handle: &str) -> RemovedSubscriptions {
        self.connections.remove(handle);
        let removed = self.remove_handle(handle);
        tracing::info!(
            handle,
            vehicles = removed.vehicles.len(),
            routes = removed.routes.len(),
            "client disconnected"
        );
        removed
    }

    /// Drops `handle` from both registries.
    pub fn remove_handle(&self, handle: &str) -> RemovedSubscriptions {
        RemovedSubscriptions {
            vehicles: self.vehicles.remove_handle(handle),
            routes: self.routes.remove_handle(handle),
        }
    }

    pub fn ingest(&self, point: TelemetryPoint) -> Result<(), IngestError> {
        self.scheduler.ingest(point)
    }

    /// Ingests on behalf of a connection, marking it as a vehicle source.
    pub fn ingest_from(&self, handle: &str, point: TelemetryPoint) -> Result<(), IngestError> {
        self.connections.classify(handle, ConnectionKind::Vehicle);
        self.ingest(point)
    }

    pub fn subscribe(&self, kind: TopicKind, topic: &str, handle: &str) -> bool {
        self.registry(kind).subscribe(topic, handle)
    }

    pub fn unsubscribe(&self, kind: TopicKind, topic: &str, handle: &str) -> bool {
        self.registry(kind).unsubscribe(topic, handle)
    }

    pub fn subscribe_vehicle(&self, vehicle_id: &str, handle: &str) -> bool {
        self.vehicles.subscribe(vehicle_id, handle)
    }

    pub fn unsubscribe_vehicle(&self, vehicle_id: &str, handle: &str) -> bool {
        self.vehicles.unsubscribe(vehicle_id, handle)
    }

    pub fn subscribe_route(&self, route_id: &str, handle: &str) -> bool {
        self.routes.subscribe(route_id, handle)
    }

    pub fn unsubscribe_route(&self, route_id: &str, handle: &str) -> bool {
        self.routes.unsubscribe(route_id, handle)
    }

    /// Trip events skip the buffer and go straight to route subscribers.
    pub fn emit_trip_event(&self, event: &TripEvent) -> DispatchReport {
        self.dispatcher.dispatch_trip_event(event)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn registry(&self, kind: TopicKind) -> &TopicRegistry {
        match kind {
            TopicKind::Vehicle => self.vehicles.as_ref(),
            TopicKind::Route => self.routes.as_ref(),
        }
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    pub fn scheduler(&self) -> &BatchScheduler {
        &self.scheduler
    }
}
