//! The `client` module defines the representation of a connected party.
//!
//! It provides the `Client` struct, which encapsulates the state of a single
//! connection, and the `ConnectionRegistry` that owns all of them and serves
//! as the delivery endpoint for the dispatcher.

pub mod pubsub_client;
pub use pubsub_client::{
    Client, ConnectionKind, ConnectionMetadata, ConnectionRegistry, ConnectionStats,
    OUTBOUND_QUEUE_CAPACITY,
};

#[cfg(test)]
mod tests;
