//! The `dispatch` module fans batches and trip events out to the handles
//! that subscribed to them.

pub mod dispatcher;

pub use dispatcher::{DispatchReport, DispatchStats, Dispatcher, Transport};

#[cfg(test)]
mod tests;
