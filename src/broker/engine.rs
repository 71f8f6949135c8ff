//! Broker engine
//!
//! This module contains the in-memory connection registry and the message
//! dispatcher built on top of it. It is responsible for:
//! - admitting and removing connections
//! - managing per-topic subscriber sets and the per-connection mirror of them
//! - delivering messages to one connection, to a topic, or to everyone
//!
//! Concurrency and usage notes:
//! - `Broker` is a cheap handle (`Clone`) around a single mutex. Every
//!   mutation and every snapshot read goes through that lock, and no lock is
//!   held across an `.await`.
//! - Delivery is a push onto the connection's unbounded channel, so a slow
//!   peer never blocks a broadcast. A closed channel means the connection's
//!   writer task is gone; the connection is then removed.
//! - Removing a connection clears it from every topic inside the same
//!   critical section, so dispatch never observes a dangling subscriber.
//! - Ids may be reused once a connection is gone. Each admit also hands out
//!   a `Registration` with a generation that is never reused; per-connection
//!   tasks tear down through it so they cannot touch a successor.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::broker::message::ServerMessage;
use crate::broker::topic::{SubscriberId, Topic, TopicSubscribers};
use crate::client::{Client, ClientId};
use crate::utils::error::RegistryError;

#[derive(Debug, Clone)]
pub struct Broker {
    inner: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<BrokerState>,
    max_connections: usize,
}

#[derive(Debug)]
struct BrokerState {
    clients: HashMap<ClientId, Client>,
    topics: HashMap<Topic, TopicSubscribers>,
    next_generation: u64,
    closed: bool,
}

impl BrokerState {
    fn new() -> Self {
        Self {
            clients: HashMap::new(),
            topics: Topic::ALL
                .into_iter()
                .map(|t| (t, TopicSubscribers::default()))
                .collect(),
            next_generation: 0,
            closed: false,
        }
    }

    fn subscriber_count(&self, topic: Topic) -> usize {
        self.topics.get(&topic).map_or(0, TopicSubscribers::len)
    }

    fn detach(&mut self, id: &SubscriberId) -> Option<Client> {
        let client = self.clients.remove(id)?;
        for subscribers in self.topics.values_mut() {
            subscribers.unsubscribe(id);
        }
        Some(client)
    }

    fn detach_generation(&mut self, id: &str, generation: u64) -> Option<Client> {
        let current = self
            .clients
            .get(id)
            .is_some_and(|c| c.generation == generation);
        if !current {
            return None;
        }
        self.detach(&id.to_string())
    }
}

/// One admitted connection: its id plus the generation it was admitted
/// under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub id: ClientId,
    pub generation: u64,
}

/// Point-in-time counts, taken under one lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrokerStats {
    pub total_connections: usize,
    pub subscriptions: BTreeMap<Topic, usize>,
}

/// Metadata reported back to a client asking for its status.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionStatus {
    pub connection_id: ClientId,
    pub connected_at: DateTime<Utc>,
    pub last_ping: DateTime<Utc>,
    pub subscriptions: Vec<Topic>,
    pub total_connections: usize,
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_CONNECTIONS)
    }
}

impl Broker {
    pub const DEFAULT_MAX_CONNECTIONS: usize = 1000;

    pub fn new(max_connections: usize) -> Self {
        Self {
            inner: Arc::new(Shared {
                state: Mutex::new(BrokerState::new()),
                max_connections,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        // State stays consistent across every critical section, so a panic
        // elsewhere does not invalidate it.
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Admits a new connection and greets it with `connection_established`.
    ///
    /// A requested id that is already live is rejected rather than replaced.
    pub fn admit(
        &self,
        sender: UnboundedSender<WsMessage>,
        requested_id: Option<String>,
    ) -> Result<Registration, RegistryError> {
        let mut client = match requested_id {
            Some(id) => Client::with_id(id, sender),
            None => Client::new(sender),
        };
        let id = client.id.clone();

        let generation = {
            let mut state = self.state();
            if state.closed {
                return Err(RegistryError::Closed);
            }
            if state.clients.contains_key(&id) {
                return Err(RegistryError::DuplicateIdentifier(id));
            }
            if state.clients.len() >= self.inner.max_connections {
                return Err(RegistryError::RegistryFull {
                    max: self.inner.max_connections,
                });
            }
            state.next_generation += 1;
            client.generation = state.next_generation;
            state.clients.insert(id.clone(), client);
            state.next_generation
        };

        info!("Connection established: {id}");

        self.send_to(
            &id,
            &ServerMessage::ConnectionEstablished {
                connection_id: id.clone(),
                available_subscriptions: Topic::ALL.to_vec(),
                timestamp: Utc::now(),
            },
        );

        Ok(Registration { id, generation })
    }

    /// Removes a connection and all of its subscriptions.
    ///
    /// Returns `false` if the id was not live; removing twice is harmless.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.state().detach(&id.to_string());
        match removed {
            Some(_) => {
                info!("Connection closed: {id}");
                true
            }
            None => false,
        }
    }

    /// Removes the connection only while it is still the one `registration`
    /// admitted; a successor reusing the id is left alone.
    pub fn remove_if(&self, registration: &Registration) -> bool {
        self.remove_generation(&registration.id, registration.generation)
    }

    fn remove_generation(&self, id: &str, generation: u64) -> bool {
        let removed = self.state().detach_generation(id, generation);
        match removed {
            Some(_) => {
                info!("Connection closed: {id}");
                true
            }
            None => false,
        }
    }

    /// Whether `registration` still names a live connection.
    pub fn is_current(&self, registration: &Registration) -> bool {
        self.state()
            .clients
            .get(&registration.id)
            .is_some_and(|c| c.generation == registration.generation)
    }

    /// Records a heartbeat for the connection.
    pub fn touch(&self, id: &str) -> bool {
        match self.state().clients.get_mut(id) {
            Some(client) => {
                client.touch();
                true
            }
            None => false,
        }
    }

    pub fn is_connected(&self, id: &str) -> bool {
        self.state().clients.contains_key(id)
    }

    /// Subscribes a live connection to a topic. Returns `false` if the id is
    /// not live.
    pub fn subscribe(&self, id: &str, topic: Topic) -> bool {
        let mut state = self.state();
        let Some(client) = state.clients.get_mut(id) else {
            return false;
        };
        client.subscriptions.insert(topic);
        state
            .topics
            .entry(topic)
            .or_default()
            .subscribe(id.to_string());
        debug!("{id} subscribed to {topic}");
        true
    }

    pub fn unsubscribe(&self, id: &str, topic: Topic) -> bool {
        let mut state = self.state();
        let Some(client) = state.clients.get_mut(id) else {
            return false;
        };
        client.subscriptions.remove(&topic);
        if let Some(subscribers) = state.topics.get_mut(&topic) {
            subscribers.unsubscribe(&id.to_string());
        }
        debug!("{id} unsubscribed from {topic}");
        true
    }

    pub fn connection_count(&self) -> usize {
        self.state().clients.len()
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.state().subscriber_count(topic)
    }

    pub fn stats(&self) -> BrokerStats {
        let state = self.state();
        BrokerStats {
            total_connections: state.clients.len(),
            subscriptions: Topic::ALL
                .into_iter()
                .map(|t| (t, state.subscriber_count(t)))
                .collect(),
        }
    }

    pub fn status_of(&self, id: &str) -> Option<ConnectionStatus> {
        let state = self.state();
        let client = state.clients.get(id)?;
        Some(ConnectionStatus {
            connection_id: client.id.clone(),
            connected_at: client.connected_at,
            last_ping: client.last_ping,
            subscriptions: client.subscriptions.iter().copied().collect(),
            total_connections: state.clients.len(),
        })
    }

    pub fn connection_ids(&self) -> Vec<ClientId> {
        self.state().clients.keys().cloned().collect()
    }

    /// Removes every connection whose last heartbeat is older than
    /// `threshold` and returns the dropped ids.
    ///
    /// The check and the removal share one critical section, so a heartbeat
    /// recorded before the sweep always saves its connection.
    pub fn sweep_stale(&self, threshold: Duration) -> Vec<ClientId> {
        let now = Instant::now();
        let removed: Vec<ClientId> = {
            let mut state = self.state();
            let stale: Vec<ClientId> = state
                .clients
                .values()
                .filter(|c| c.is_stale(now, threshold))
                .map(|c| c.id.clone())
                .collect();
            stale
                .into_iter()
                .filter(|id| state.detach(id).is_some())
                .collect()
        };
        for id in &removed {
            info!("Removed stale connection: {id}");
        }
        removed
    }

    /// Sends one message to one connection.
    ///
    /// An unknown id is silently ignored. A failed write removes the
    /// connection; the failure is logged and never returned.
    pub fn send_to(&self, id: &str, message: &ServerMessage) -> bool {
        match encode(message) {
            Some(frame) => self.deliver(id, frame),
            None => false,
        }
    }

    /// Fans `data` out to every current subscriber of `topic`.
    ///
    /// The subscriber set is copied under the lock; subscriptions changing
    /// during delivery never disturb the walk. Returns the number of
    /// connections the message was handed to.
    pub fn broadcast(&self, topic: Topic, data: Value) -> usize {
        let subscribers = {
            let state = self.state();
            match state.topics.get(&topic) {
                Some(subscribers) => subscribers.snapshot(),
                None => return 0,
            }
        };
        if subscribers.is_empty() {
            return 0;
        }

        let message = ServerMessage::topic_update(topic, data, subscribers.len());
        let Some(frame) = encode(&message) else {
            return 0;
        };

        let delivered = subscribers
            .iter()
            .filter(|id| self.deliver(id, frame.clone()))
            .count();
        debug!(
            "Broadcast {} to {delivered}/{} subscribers of {topic}",
            message.kind(),
            subscribers.len()
        );
        delivered
    }

    /// Sends a message to every live connection, subscribed or not.
    pub fn broadcast_all(&self, message: &ServerMessage) -> usize {
        let Some(frame) = encode(message) else {
            return 0;
        };
        self.connection_ids()
            .iter()
            .filter(|id| self.deliver(id, frame.clone()))
            .count()
    }

    /// Drops every connection and refuses further admits and deliveries.
    pub fn close(&self) -> usize {
        let mut state = self.state();
        state.closed = true;
        let dropped = state.clients.len();
        state.clients.clear();
        for subscribers in state.topics.values_mut() {
            subscribers.subscribers.clear();
        }
        info!("Broker closed, dropped {dropped} connections");
        dropped
    }

    fn deliver(&self, id: &str, frame: WsMessage) -> bool {
        let result = {
            let state = self.state();
            if state.closed {
                return false;
            }
            match state.clients.get(id) {
                Some(client) => (client.generation, client.sender.send(frame)),
                None => return false,
            }
        };

        match result {
            (_, Ok(())) => true,
            (generation, Err(e)) => {
                warn!("Failed to send to {id}: {e}");
                self.remove_generation(id, generation);
                false
            }
        }
    }
}

fn encode(message: &ServerMessage) -> Option<WsMessage> {
    match serde_json::to_string(message) {
        Ok(json) => Some(WsMessage::text(json)),
        Err(e) => {
            warn!("Failed to serialize {} message: {e}", message.kind());
            None
        }
    }
}
