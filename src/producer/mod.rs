//! Background producers
//!
//! A producer is a long-lived loop bound to one topic. Each iteration polls
//! an `UpdateSource` and broadcasts one message per returned record. The
//! fetch is skipped while the topic has no subscribers, and a failed fetch
//! is logged and retried after `Schedule::retry_delay`; nothing a source
//! does can end the loop. Only the cancellation token does.

pub mod simulated;
pub mod timelapse;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broker::Broker;
use crate::broker::topic::Topic;
use crate::config::ProducerSettings;
use crate::utils::error::SourceError;

/// A collaborator service that yields update records for one topic.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Fetches the records to broadcast this round. An empty list means
    /// nothing changed.
    async fn fetch(&self) -> Result<Vec<Value>, SourceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub interval: Duration,
    pub retry_delay: Duration,
}

/// Everything the supervisor needs to spawn one producer.
#[derive(Clone)]
pub struct ProducerSpec {
    pub topic: Topic,
    pub source: Arc<dyn UpdateSource>,
    pub schedule: Schedule,
}

impl std::fmt::Debug for ProducerSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducerSpec")
            .field("topic", &self.topic)
            .field("source", &self.source.name())
            .field("schedule", &self.schedule)
            .finish()
    }
}

/// Runs one producer until `cancel` fires.
///
/// Cancellation is observed while fetching, between broadcasts of one batch,
/// and while sleeping; once it fires nothing more is broadcast.
pub async fn run_producer(
    broker: Broker,
    topic: Topic,
    source: Arc<dyn UpdateSource>,
    schedule: Schedule,
    cancel: CancellationToken,
) {
    info!(
        "Producer {} started for {topic} every {:?}",
        source.name(),
        schedule.interval
    );

    loop {
        let delay = if broker.subscriber_count(topic) == 0 {
            schedule.interval
        } else {
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                fetched = source.fetch() => fetched,
            };

            match fetched {
                Ok(updates) => {
                    for update in updates {
                        if cancel.is_cancelled() {
                            break;
                        }
                        broker.broadcast(topic, update);
                    }
                    schedule.interval
                }
                Err(e) => {
                    warn!("Error in {} producer for {topic}: {e}", source.name());
                    schedule.retry_delay
                }
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    debug!("Producer {} for {topic} stopped", source.name());
}

/// The simulated collaborators, one per polled topic, on the configured
/// schedules.
pub fn simulated_producers(settings: &ProducerSettings) -> Vec<ProducerSpec> {
    let schedule = |interval_secs: u64, retry_secs: u64| Schedule {
        interval: Duration::from_secs(interval_secs),
        retry_delay: Duration::from_secs(retry_secs),
    };

    vec![
        ProducerSpec {
            topic: Topic::Environmental,
            source: Arc::new(simulated::EnvironmentalReadings::default()),
            schedule: schedule(
                settings.environmental_interval_secs,
                settings.environmental_retry_secs,
            ),
        },
        ProducerSpec {
            topic: Topic::Hazards,
            source: Arc::new(simulated::HazardFeed::default()),
            schedule: schedule(settings.hazards_interval_secs, settings.hazards_retry_secs),
        },
        ProducerSpec {
            topic: Topic::Alerts,
            source: Arc::new(simulated::AlertFeed::default()),
            schedule: schedule(settings.alerts_interval_secs, settings.alerts_retry_secs),
        },
        ProducerSpec {
            topic: Topic::SatelliteUpdates,
            source: Arc::new(simulated::SatelliteFeed::default()),
            schedule: schedule(
                settings.satellite_interval_secs,
                settings.satellite_retry_secs,
            ),
        },
    ]
}

#[cfg(test)]
mod tests;
