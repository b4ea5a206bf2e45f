//! # FleetCast
//!
//! `fleetcast` is an in-memory telemetry distribution engine for vehicle
//! fleets. Vehicles stream position reports over WebSockets; the engine keeps
//! only the latest report per vehicle, flushes them as batches on an interval
//! or when the buffer fills, and fans each batch out to the viewers that
//! subscribed to those vehicles. Trip events bypass batching and go straight
//! to route subscribers.
//!
//! ## Core Modules
//!
//! - `broker`: topic registries, telemetry types and the `Broker` engine that
//!   ties everything together.
//! - `batcher`: the latest-wins buffer, sealed batches and the flush scheduler.
//! - `dispatch`: per-subscriber fan-out of batches and trip events.
//! - `client`: connected parties and the connection table used for delivery.
//! - `stats`: read-only snapshots across all components.
//! - `config`: loading and validating settings.
//! - `transport`: the WebSocket server and its JSON protocol.
//! - `utils`: error types and logging.

pub mod batcher;
pub mod broker;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod stats;
pub mod transport;
pub mod utils;
