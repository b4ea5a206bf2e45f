//! The `batcher` module turns a stream of telemetry points into bounded,
//! immutable batches: a latest-wins buffer keyed by vehicle, and a scheduler
//! that drains it on an interval or when it fills up.

pub mod batch;
pub mod buffer;
pub mod scheduler;

pub use batch::Batch;
pub use buffer::{BufferedPoint, TelemetryBuffer};
pub use scheduler::{BatchScheduler, BatcherStats, FlushTrigger};
