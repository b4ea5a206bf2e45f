//! The `error` module defines the error types used within `fleetcast`.
//!
//! Errors are grouped by who gets to see them:
//!
//! - [`ConfigError`] is fatal at start-up; the process must not start.
//! - [`IngestError`] is returned to whoever submitted a telemetry point.
//! - [`DeliveryError`] stays inside the dispatcher and only shows up in logs
//!   and stats.
//! - [`TransportError`] covers the WebSocket server's own I/O.

use thiserror::Error;

/// Configuration could not be loaded or holds an out-of-range value.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("{name} = {value} is out of range [{min}, {max}]")]
    OutOfRange {
        name: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },
}

/// A telemetry point was rejected before it reached the buffer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IngestError {
    #[error("telemetry point has no vehicle id")]
    MissingVehicleId,

    #[error("telemetry field `{field}` is not a finite number ({value})")]
    NonFinite { field: &'static str, value: f64 },
}

/// Delivery to a single handle failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("no live connection for handle {0}")]
    UnknownHandle(String),

    #[error("outbound channel for handle {0} is closed")]
    ChannelClosed(String),

    #[error("outbound queue for handle {0} is full")]
    QueueFull(String),
}

/// The WebSocket server could not bind or accept.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("listener failed: {0}")]
    Io(#[from] std::io::Error),
}
