//! Timelapse generation progress for a single requesting connection.

use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info};

use crate::broker::{Broker, Registration};
use crate::broker::message::ServerMessage;
use crate::broker::topic::Topic;

/// Generation stages and the progress percentage reached at each.
pub const STAGES: [(&str, u8); 8] = [
    ("Initializing", 5),
    ("Querying satellite imagery", 15),
    ("Downloading images", 25),
    ("Processing and alignment", 45),
    ("Generating frames", 65),
    ("Creating video", 80),
    ("Finalizing", 95),
    ("Complete", 100),
];

const STORAGE_BASE_URL: &str = "https://storage.example.com/timelapses";

/// Walks `request_id` through every generation stage, reporting each to
/// the registered connection, then announces the finished video.
///
/// Stops as soon as that connection is no longer registered, even if a new
/// connection has taken over its id.
pub async fn monitor_timelapse(
    broker: Broker,
    registration: Registration,
    request_id: String,
    stage_delay: Duration,
) {
    let connection_id = registration.id.as_str();

    broker.subscribe(connection_id, Topic::TimelapseProgress);
    broker.send_to(
        connection_id,
        &ServerMessage::SubscriptionConfirmed {
            subscription_type: Topic::TimelapseProgress,
            timestamp: Utc::now(),
        },
    );
    broker.send_to(
        connection_id,
        &ServerMessage::TimelapseStatus {
            request_id: request_id.clone(),
            status: "monitoring".to_string(),
            message: "Connected to time-lapse progress updates".to_string(),
            timestamp: Utc::now(),
        },
    );

    for (stage, progress) in STAGES {
        if !broker.is_current(&registration) {
            debug!("Timelapse {request_id} lost its connection before {stage}");
            return;
        }
        let update = ServerMessage::topic_update(
            Topic::TimelapseProgress,
            json!({
                "request_id": request_id,
                "stage": stage,
                "progress": progress,
            }),
            broker.subscriber_count(Topic::TimelapseProgress),
        );
        if !broker.send_to(connection_id, &update) {
            debug!("Timelapse {request_id} lost its connection at {stage}");
            return;
        }
        tokio::time::sleep(stage_delay).await;
    }

    if !broker.is_current(&registration) {
        return;
    }
    let complete = ServerMessage::TimelapseComplete {
        request_id: request_id.clone(),
        video_url: format!("{STORAGE_BASE_URL}/{request_id}.mp4"),
        thumbnail_url: format!("{STORAGE_BASE_URL}/{request_id}_thumb.jpg"),
        timestamp: Utc::now(),
    };
    if broker.send_to(connection_id, &complete) {
        info!("Timelapse {request_id} complete");
    }
}
