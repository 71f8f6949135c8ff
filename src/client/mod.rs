//! The `client` module defines the representation of a connected client.
//!
//! It provides the `Client` struct, which encapsulates the state of a single
//! live connection: its identifier, the channel feeding its socket writer,
//! its heartbeat bookkeeping and the topics it is subscribed to.

pub mod pubsub_client;
pub use pubsub_client::{Client, ClientId};
