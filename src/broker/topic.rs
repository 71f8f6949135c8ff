//! Topic management
//!
//! `Topic` is the closed set of broadcast channels clients may subscribe to.
//! A `TopicSubscribers` holds the subscriber IDs for one topic; duplicate
//! subscriptions are a no-op.
//!
//! Concurrency note: callers must synchronize access to `TopicSubscribers`
//! (the broker keeps every set behind its single lock).

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub type SubscriberId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Environmental,
    Hazards,
    Alerts,
    TimelapseProgress,
    SatelliteUpdates,
}

impl Topic {
    pub const ALL: [Topic; 5] = [
        Topic::Environmental,
        Topic::Hazards,
        Topic::Alerts,
        Topic::TimelapseProgress,
        Topic::SatelliteUpdates,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Environmental => "environmental",
            Topic::Hazards => "hazards",
            Topic::Alerts => "alerts",
            Topic::TimelapseProgress => "timelapse_progress",
            Topic::SatelliteUpdates => "satellite_updates",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a topic name is outside the closed set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTopic(pub String);

impl FromStr for Topic {
    type Err = UnknownTopic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownTopic(s.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct TopicSubscribers {
    pub subscribers: HashSet<SubscriberId>,
}

impl TopicSubscribers {

    /// Add a subscriber to the topic. Duplicate adds are ignored.
    pub fn subscribe(&mut self, id: SubscriberId) {
        self.subscribers.insert(id);
    }

    /// Remove a subscriber from the topic.
    pub fn unsubscribe(&mut self, id: &SubscriberId) {
        self.subscribers.remove(id);
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Copy of the current subscriber ids, safe to walk without the lock.
    pub fn snapshot(&self) -> Vec<SubscriberId> {
        self.subscribers.iter().cloned().collect()
    }
}
