//! The `broker` module is the connection registry and message dispatcher.
//!
//! - `topic`: the closed set of topics and their subscriber sets.
//! - `message`: every frame the server pushes to clients.
//! - `engine`: the `Broker` that owns connections and delivers messages.

pub mod engine;
pub mod message;
pub mod topic;

pub use engine::{Broker, BrokerStats, ConnectionStatus, Registration};
pub use message::{ServerMessage, TopicUpdate};
pub use topic::Topic;
