//! Inbound message handling
//!
//! Turns one text frame from a client into registry changes and a reply to
//! that same client. Nothing here can end the connection: protocol problems
//! are answered with an `error` message and the socket stays open.

use std::panic::{AssertUnwindSafe, catch_unwind};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::broker::message::ServerMessage;
use crate::broker::topic::Topic;
use crate::broker::Broker;
use crate::transport::message::{ClientMessage, InvalidFormat, TopicRequest};

#[derive(Debug, Error)]
enum HandlerError {
    #[error("connection {0} is no longer registered")]
    ConnectionGone(String),
}

/// Handles one text frame from `connection_id`.
pub fn handle_text(broker: &Broker, connection_id: &str, text: &str) {
    let outcome = catch_unwind(AssertUnwindSafe(|| dispatch(broker, connection_id, text)));

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            debug!("Dropped message from {connection_id}: {e}");
        }
        Err(_) => {
            error!("Error handling message from {connection_id}");
            broker.send_to(connection_id, &ServerMessage::error("Internal server error"));
        }
    }
}

fn dispatch(broker: &Broker, connection_id: &str, text: &str) -> Result<(), HandlerError> {
    let message = match ClientMessage::parse(text) {
        Ok(message) => message,
        Err(InvalidFormat) => {
            warn!(
                "Invalid client message from {connection_id}: {}",
                text.chars().take(100).collect::<String>()
            );
            broker.send_to(connection_id, &ServerMessage::error("Invalid JSON format"));
            return Ok(());
        }
    };

    match message {
        ClientMessage::Ping => {
            if !broker.touch(connection_id) {
                return Err(HandlerError::ConnectionGone(connection_id.to_string()));
            }
            broker.send_to(connection_id, &ServerMessage::pong());
        }
        ClientMessage::Subscribe(request) => {
            let Some(topic) = resolve(broker, connection_id, request) else {
                return Ok(());
            };
            if !broker.subscribe(connection_id, topic) {
                return Err(HandlerError::ConnectionGone(connection_id.to_string()));
            }
            broker.send_to(
                connection_id,
                &ServerMessage::SubscriptionConfirmed {
                    subscription_type: topic,
                    timestamp: Utc::now(),
                },
            );
        }
        ClientMessage::Unsubscribe(request) => {
            let Some(topic) = resolve(broker, connection_id, request) else {
                return Ok(());
            };
            if !broker.unsubscribe(connection_id, topic) {
                return Err(HandlerError::ConnectionGone(connection_id.to_string()));
            }
            broker.send_to(
                connection_id,
                &ServerMessage::UnsubscriptionConfirmed {
                    subscription_type: topic,
                    timestamp: Utc::now(),
                },
            );
        }
        ClientMessage::GetStatus => {
            let status = broker
                .status_of(connection_id)
                .ok_or_else(|| HandlerError::ConnectionGone(connection_id.to_string()))?;
            broker.send_to(
                connection_id,
                &ServerMessage::Status {
                    connection_id: status.connection_id,
                    connected_at: status.connected_at,
                    last_ping: status.last_ping,
                    subscriptions: status.subscriptions,
                    total_connections: status.total_connections,
                    timestamp: Utc::now(),
                },
            );
        }
        ClientMessage::Unknown(kind) => {
            broker.send_to(
                connection_id,
                &ServerMessage::error(format!("Unknown message type: {kind}")),
            );
        }
    }
    Ok(())
}

/// Resolves the requested topic, answering the client with an error when it
/// cannot be resolved.
fn resolve(broker: &Broker, connection_id: &str, request: TopicRequest) -> Option<Topic> {
    let reason = match request {
        TopicRequest::Known(topic) => return Some(topic),
        TopicRequest::Unknown(name) => format!("Unknown subscription type: {name}"),
        TopicRequest::Missing => "Missing subscription_type".to_string(),
    };
    broker.send_to(connection_id, &ServerMessage::error(reason));
    None
}
