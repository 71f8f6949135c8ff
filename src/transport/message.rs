use serde::Deserialize;

use crate::broker::topic::{Topic, UnknownTopic};

/// Control frames a client may send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Ping,
    Subscribe(TopicRequest),
    Unsubscribe(TopicRequest),
    GetStatus,
    /// A well-formed envelope whose `type` is not recognized.
    Unknown(String),
}

/// The topic named in a subscribe/unsubscribe frame, as far as it could be
/// resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicRequest {
    Known(Topic),
    Unknown(String),
    Missing,
}

/// The frame was not a JSON object with a string `type` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidFormat;

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    subscription_type: Option<String>,
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self, InvalidFormat> {
        let envelope: Envelope = serde_json::from_str(text).map_err(|_| InvalidFormat)?;

        let message = match envelope.kind.as_str() {
            "ping" => ClientMessage::Ping,
            "subscribe" => ClientMessage::Subscribe(TopicRequest::from(envelope.subscription_type)),
            "unsubscribe" => {
                ClientMessage::Unsubscribe(TopicRequest::from(envelope.subscription_type))
            }
            "get_status" => ClientMessage::GetStatus,
            _ => ClientMessage::Unknown(envelope.kind),
        };
        Ok(message)
    }
}

impl From<Option<String>> for TopicRequest {
    fn from(name: Option<String>) -> Self {
        match name {
            None => TopicRequest::Missing,
            Some(name) => match name.parse::<Topic>() {
                Ok(topic) => TopicRequest::Known(topic),
                Err(UnknownTopic(name)) => TopicRequest::Unknown(name),
            },
        }
    }
}
