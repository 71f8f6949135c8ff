use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tungstenite::protocol::Message as WsMessage;

use crate::broker::topic::Topic;

pub type ClientId = String;

/// Represents a connected WebSocket client.
///
/// Each client is uniquely identified by an `id` and has a channel (`sender`)
/// drained by the connection's writer task. Dropping the `Client` drops the
/// sender, which ends the writer task and closes the socket.
#[derive(Debug)]
pub struct Client {
    /// Unique identifier, client-supplied or a generated UUID.
    pub id: ClientId,

    /// Assigned by the broker on admit; distinguishes connections that
    /// reuse an id.
    pub generation: u64,

    /// Channel to send WebSocket messages to the client.
    pub sender: UnboundedSender<WsMessage>,

    pub connected_at: DateTime<Utc>,

    /// Wall-clock time of the last heartbeat, reported by `get_status`.
    pub last_ping: DateTime<Utc>,

    /// Monotonic time of the last heartbeat, used for staleness.
    pub last_seen: Instant,

    /// Mirrors the topic subscriber sets; updated under the same lock.
    pub subscriptions: BTreeSet<Topic>,
}

impl Client {
    /// Creates a client with a freshly generated id.
    pub fn new(sender: UnboundedSender<WsMessage>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), sender)
    }

    pub fn with_id(id: impl Into<ClientId>, sender: UnboundedSender<WsMessage>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            generation: 0,
            sender,
            connected_at: now,
            last_ping: now,
            last_seen: Instant::now(),
            subscriptions: BTreeSet::new(),
        }
    }

    /// Records a heartbeat from the peer.
    pub fn touch(&mut self) {
        self.last_ping = Utc::now();
        self.last_seen = Instant::now();
    }

    pub fn is_stale(&self, now: Instant, threshold: std::time::Duration) -> bool {
        now.saturating_duration_since(self.last_seen) > threshold
    }
}
