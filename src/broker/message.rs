//! Message definitions for the broker
//!
//! `ServerMessage` is every frame the server can push to a client. It is
//! serialized as a JSON object whose `type` field names the variant, and
//! every variant carries a `timestamp` (RFC 3339, UTC).
//!
//! Topic broadcasts share one body, `TopicUpdate`, which the dispatcher
//! stamps with the topic name and the subscriber count at broadcast time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::broker::topic::Topic;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnectionEstablished {
        connection_id: String,
        available_subscriptions: Vec<Topic>,
        timestamp: DateTime<Utc>,
    },
    SubscriptionConfirmed {
        subscription_type: Topic,
        timestamp: DateTime<Utc>,
    },
    UnsubscriptionConfirmed {
        subscription_type: Topic,
        timestamp: DateTime<Utc>,
    },
    Pong {
        timestamp: DateTime<Utc>,
    },
    /// Probe sent after a quiet receive window; clients answer with `ping`.
    PingRequest {
        timestamp: DateTime<Utc>,
    },
    Status {
        connection_id: String,
        connected_at: DateTime<Utc>,
        last_ping: DateTime<Utc>,
        subscriptions: Vec<Topic>,
        total_connections: usize,
        timestamp: DateTime<Utc>,
    },
    Heartbeat {
        active_connections: usize,
        timestamp: DateTime<Utc>,
    },
    Error {
        message: String,
        timestamp: DateTime<Utc>,
    },
    EnvironmentalUpdate(TopicUpdate),
    HazardUpdate(TopicUpdate),
    Alert(TopicUpdate),
    SatelliteUpdate(TopicUpdate),
    TimelapseProgress(TopicUpdate),
    TimelapseStatus {
        request_id: String,
        status: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
    TimelapseComplete {
        request_id: String,
        video_url: String,
        thumbnail_url: String,
        timestamp: DateTime<Utc>,
    },
}

/// Body of a topic broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicUpdate {
    pub subscription_type: Topic,
    pub subscriber_count: usize,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl ServerMessage {
    /// Wraps `data` in the message variant that belongs to `topic`.
    pub fn topic_update(topic: Topic, data: Value, subscriber_count: usize) -> Self {
        let update = TopicUpdate {
            subscription_type: topic,
            subscriber_count,
            data,
            timestamp: Utc::now(),
        };
        match topic {
            Topic::Environmental => ServerMessage::EnvironmentalUpdate(update),
            Topic::Hazards => ServerMessage::HazardUpdate(update),
            Topic::Alerts => ServerMessage::Alert(update),
            Topic::SatelliteUpdates => ServerMessage::SatelliteUpdate(update),
            Topic::TimelapseProgress => ServerMessage::TimelapseProgress(update),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn pong() -> Self {
        ServerMessage::Pong {
            timestamp: Utc::now(),
        }
    }

    pub fn ping_request() -> Self {
        ServerMessage::PingRequest {
            timestamp: Utc::now(),
        }
    }

    pub fn heartbeat(active_connections: usize) -> Self {
        ServerMessage::Heartbeat {
            active_connections,
            timestamp: Utc::now(),
        }
    }

    /// The wire `type` tag of this message, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::ConnectionEstablished { .. } => "connection_established",
            ServerMessage::SubscriptionConfirmed { .. } => "subscription_confirmed",
            ServerMessage::UnsubscriptionConfirmed { .. } => "unsubscription_confirmed",
            ServerMessage::Pong { .. } => "pong",
            ServerMessage::PingRequest { .. } => "ping_request",
            ServerMessage::Status { .. } => "status",
            ServerMessage::Heartbeat { .. } => "heartbeat",
            ServerMessage::Error { .. } => "error",
            ServerMessage::EnvironmentalUpdate(_) => "environmental_update",
            ServerMessage::HazardUpdate(_) => "hazard_update",
            ServerMessage::Alert(_) => "alert",
            ServerMessage::SatelliteUpdate(_) => "satellite_update",
            ServerMessage::TimelapseProgress(_) => "timelapse_progress",
            ServerMessage::TimelapseStatus { .. } => "timelapse_status",
            ServerMessage::TimelapseComplete { .. } => "timelapse_complete",
        }
    }
}
