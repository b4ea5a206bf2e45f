//! The `transport` module is responsible for network communication with
//! vehicles and viewers over WebSockets.
//!
//! It defines the JSON protocol spoken on the wire and implements the server
//! that manages connections, parses requests and forwards them to the broker.

pub mod message;
pub mod websocket;
