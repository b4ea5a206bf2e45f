//! Statistics surface
//!
//! [`StatsAggregator`] reads counters and gauges from the other components
//! and assembles a [`StatsSnapshot`]. It never mutates anything. Each
//! component answers from atomics or a single short lock, so taking a
//! snapshot does not hold up ingestion or a flush; the parts are read one
//! after another, so the snapshot as a whole is not a single atomic cut.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::batcher::{BatchScheduler, BatcherStats};
use crate::broker::topic::{RegistrySnapshot, TopicRegistry};
use crate::client::{ConnectionRegistry, ConnectionStats};
use crate::dispatch::{DispatchStats, Dispatcher};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub taken_at: i64,
    pub total_points_ingested: u64,
    pub rejected_points: u64,
    pub vehicle_subscriptions: RegistrySnapshot,
    pub route_subscriptions: RegistrySnapshot,
    pub batcher: BatcherStats,
    pub dispatch: DispatchStats,
    pub connections: ConnectionStats,
}

pub struct StatsAggregator {
    scheduler: Arc<BatchScheduler>,
    vehicles: Arc<TopicRegistry>,
    routes: Arc<TopicRegistry>,
    dispatcher: Arc<Dispatcher>,
    connections: Arc<ConnectionRegistry>,
}

impl StatsAggregator {
    pub fn new(
        scheduler: Arc<BatchScheduler>,
        vehicles: Arc<TopicRegistry>,
        routes: Arc<TopicRegistry>,
        dispatcher: Arc<Dispatcher>,
        connections: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            scheduler,
            vehicles,
            routes,
            dispatcher,
            connections,
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            taken_at: chrono::Utc::now().timestamp_millis(),
            total_points_ingested: self.scheduler.total_ingested(),
            rejected_points: self.scheduler.total_rejected(),
            vehicle_subscriptions: self.vehicles.snapshot(),
            route_subscriptions: self.routes.snapshot(),
            batcher: self.scheduler.stats(),
            dispatch: self.dispatcher.stats(),
            connections: self.connections.stats(),
        }
    }
}
