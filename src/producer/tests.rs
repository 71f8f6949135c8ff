use super::simulated::{AlertFeed, EnvironmentalReadings, HazardFeed, SatelliteFeed};
use super::timelapse::{STAGES, monitor_timelapse};
use super::{Schedule, UpdateSource, run_producer, simulated_producers};
use crate::broker::Broker;
use crate::broker::topic::Topic;
use crate::config::Settings;
use crate::utils::error::SourceError;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_util::sync::CancellationToken;
use tungstenite::protocol::Message as WsMessage;

/// Returns queued results in order, then empty batches.
#[derive(Default)]
struct ScriptedSource {
    calls: AtomicUsize,
    script: Mutex<VecDeque<Result<Vec<Value>, SourceError>>>,
}

impl ScriptedSource {
    fn new(script: Vec<Result<Vec<Value>, SourceError>>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            script: Mutex::new(script.into()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpdateSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch(&self) -> Result<Vec<Value>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script.lock().unwrap().pop_front().unwrap_or(Ok(Vec::new()))
    }
}

fn schedule() -> Schedule {
    Schedule {
        interval: Duration::from_secs(300),
        retry_delay: Duration::from_secs(60),
    }
}

fn subscriber(broker: &Broker, topic: Topic) -> (String, UnboundedReceiver<WsMessage>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
    let id = broker.admit(tx, None).unwrap().id;
    rx.try_recv().expect("greeting");
    broker.subscribe(&id, topic);
    (id, rx)
}

async fn next_json(rx: &mut UnboundedReceiver<WsMessage>) -> Value {
    match rx.recv().await.expect("channel open") {
        WsMessage::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("Expected a text message, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_producer_skips_fetch_without_subscribers() {
    let broker = Broker::default();
    let source = ScriptedSource::new(vec![Ok(vec![json!({"n": 1})])]);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(run_producer(
        broker.clone(),
        Topic::Environmental,
        source.clone(),
        schedule(),
        cancel.clone(),
    ));

    tokio::time::sleep(Duration::from_secs(1000)).await;
    assert_eq!(source.calls(), 0);

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_producer_broadcasts_each_record_in_order() {
    let broker = Broker::default();
    let (_a, mut rx_a) = subscriber(&broker, Topic::Environmental);
    let (_b, mut rx_b) = subscriber(&broker, Topic::Environmental);
    let source = ScriptedSource::new(vec![Ok(vec![json!({"seq": 1}), json!({"seq": 2})])]);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(run_producer(
        broker.clone(),
        Topic::Environmental,
        source.clone(),
        schedule(),
        cancel.clone(),
    ));

    for rx in [&mut rx_a, &mut rx_b] {
        let first = next_json(rx).await;
        let second = next_json(rx).await;
        assert_eq!(first["type"], "environmental_update");
        assert_eq!(first["data"]["seq"], 1);
        assert_eq!(second["data"]["seq"], 2);
        assert_eq!(second["subscriber_count"], 2);
    }

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_producer_survives_source_failures() {
    let broker = Broker::default();
    let (_id, mut rx) = subscriber(&broker, Topic::Hazards);
    let source = ScriptedSource::new(vec![
        Err(SourceError::Unavailable("hazard model offline".to_string())),
        Err(SourceError::Unavailable("connection reset".to_string())),
        Ok(vec![json!({"hazard_type": "flood"})]),
    ]);
    let cancel = CancellationToken::new();
    let started = tokio::time::Instant::now();
    let handle = tokio::spawn(run_producer(
        broker.clone(),
        Topic::Hazards,
        source.clone(),
        schedule(),
        cancel.clone(),
    ));

    let msg = next_json(&mut rx).await;
    assert_eq!(msg["type"], "hazard_update");
    assert_eq!(msg["data"]["hazard_type"], "flood");
    assert_eq!(source.calls(), 3);
    // Two failures, each followed by the retry delay rather than the interval.
    assert!(started.elapsed() >= Duration::from_secs(120));
    assert!(started.elapsed() < Duration::from_secs(300));

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_producer_polls_on_interval() {
    let broker = Broker::default();
    let (_id, _rx) = subscriber(&broker, Topic::Alerts);
    let source = ScriptedSource::new(Vec::new());
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(run_producer(
        broker.clone(),
        Topic::Alerts,
        source.clone(),
        schedule(),
        cancel.clone(),
    ));

    // Fetches at t=0, 300 and 600.
    tokio::time::sleep(Duration::from_secs(650)).await;
    assert_eq!(source.calls(), 3);

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_producer_stops_promptly_on_cancel() {
    let broker = Broker::default();
    let (_id, mut rx) = subscriber(&broker, Topic::Alerts);
    let source = ScriptedSource::new(Vec::new());
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(run_producer(
        broker.clone(),
        Topic::Alerts,
        source.clone(),
        schedule(),
        cancel.clone(),
    ));

    tokio::time::sleep(Duration::from_secs(10)).await;
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("producer did not stop within one second")
        .unwrap();

    // Queued after the stop: nothing is broadcast any more.
    source
        .script
        .lock()
        .unwrap()
        .push_back(Ok(vec![json!({"late": true})]));
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_simulated_sources_shapes() {
    let readings = EnvironmentalReadings::default().fetch().await.unwrap();
    assert_eq!(readings.len(), 8);
    assert_eq!(readings[0]["location"]["name"], "New York");
    assert!(readings[0]["environmental_data"]["aqi"].is_u64());
    assert_eq!(readings[0]["update_type"], "routine");
    for reading in &readings {
        let pollutant = reading["environmental_data"]["dominant_pollutant"]
            .as_str()
            .unwrap();
        assert!(["pm25", "pm10", "o3", "no2"].contains(&pollutant));
    }

    let hazards = HazardFeed::with_update_chance(1.0).fetch().await.unwrap();
    assert!((1..=2).contains(&hazards.len()));
    assert_eq!(hazards[0]["hazard_type"], "wildfire");

    let alerts = AlertFeed::with_update_chance(1.0).fetch().await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["alert_type"], "simulated");
    assert!(alerts[0]["id"].as_str().unwrap().starts_with("sim_"));

    let scenes = SatelliteFeed::with_update_chance(1.0).fetch().await.unwrap();
    assert_eq!(scenes.len(), 1);
    assert_eq!(scenes[0]["processing_level"], "L2A");
    let quality = scenes[0]["data_quality"].as_str().unwrap();
    assert!(["excellent", "good", "fair"].contains(&quality));
    assert!(scenes[0]["satellite"].is_string());
}

#[tokio::test]
async fn test_simulated_sources_can_stay_quiet() {
    assert!(HazardFeed::with_update_chance(0.0).fetch().await.unwrap().is_empty());
    assert!(AlertFeed::with_update_chance(0.0).fetch().await.unwrap().is_empty());
    assert!(SatelliteFeed::with_update_chance(0.0).fetch().await.unwrap().is_empty());
    assert!(EnvironmentalReadings::with_update_chance(0.0).fetch().await.unwrap().is_empty());
}

#[test]
fn test_simulated_producers_follow_settings() {
    let mut settings = Settings::default().producers;
    settings.alerts_interval_secs = 7;
    let specs = simulated_producers(&settings);

    let topics: Vec<Topic> = specs.iter().map(|s| s.topic).collect();
    assert_eq!(
        topics,
        vec![
            Topic::Environmental,
            Topic::Hazards,
            Topic::Alerts,
            Topic::SatelliteUpdates
        ]
    );
    assert_eq!(specs[0].schedule.interval, Duration::from_secs(300));
    assert_eq!(specs[1].schedule.interval, Duration::from_secs(600));
    assert_eq!(specs[2].schedule.interval, Duration::from_secs(7));
    assert_eq!(specs[0].schedule.retry_delay, Duration::from_secs(60));
    assert_eq!(specs[1].schedule.retry_delay, Duration::from_secs(120));
    assert_eq!(specs[2].schedule.retry_delay, Duration::from_secs(60));
    assert_eq!(specs[3].schedule.retry_delay, Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn test_timelapse_monitor_walks_every_stage() {
    let broker = Broker::default();
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
    let registration = broker
        .admit(tx, Some("timelapse_req-9".to_string()))
        .unwrap();
    assert_eq!(next_json(&mut rx).await["type"], "connection_established");

    monitor_timelapse(
        broker.clone(),
        registration,
        "req-9".to_string(),
        Duration::from_secs(5),
    )
    .await;

    assert_eq!(next_json(&mut rx).await["type"], "subscription_confirmed");
    let status = next_json(&mut rx).await;
    assert_eq!(status["type"], "timelapse_status");
    assert_eq!(status["status"], "monitoring");

    for (stage, progress) in STAGES {
        let msg = next_json(&mut rx).await;
        assert_eq!(msg["type"], "timelapse_progress");
        assert_eq!(msg["data"]["stage"], stage);
        assert_eq!(msg["data"]["progress"], progress);
    }

    let done = next_json(&mut rx).await;
    assert_eq!(done["type"], "timelapse_complete");
    assert_eq!(
        done["video_url"],
        "https://storage.example.com/timelapses/req-9.mp4"
    );
    assert_eq!(broker.subscriber_count(Topic::TimelapseProgress), 1);
}

#[tokio::test(start_paused = true)]
async fn test_timelapse_progress_reports_topic_subscriber_count() {
    let broker = Broker::default();
    let (_watcher, _rx_watcher) = subscriber(&broker, Topic::TimelapseProgress);
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
    let registration = broker.admit(tx, None).unwrap();
    next_json(&mut rx).await;

    tokio::spawn(monitor_timelapse(
        broker.clone(),
        registration,
        "req-3".to_string(),
        Duration::from_secs(5),
    ));

    next_json(&mut rx).await;
    next_json(&mut rx).await;
    let first = next_json(&mut rx).await;
    assert_eq!(first["type"], "timelapse_progress");
    assert_eq!(first["subscriber_count"], 2);
}

#[tokio::test(start_paused = true)]
async fn test_timelapse_monitor_stops_when_connection_removed() {
    let broker = Broker::default();
    let (tx, _rx) = mpsc::unbounded_channel::<WsMessage>();
    let registration = broker.admit(tx, None).unwrap();
    let id = registration.id.clone();

    let monitor = tokio::spawn(monitor_timelapse(
        broker.clone(),
        registration,
        "req-1".to_string(),
        Duration::from_secs(5),
    ));
    tokio::time::sleep(Duration::from_secs(7)).await;
    broker.remove(&id);

    tokio::time::timeout(Duration::from_secs(10), monitor)
        .await
        .expect("monitor kept running")
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_timelapse_monitor_ignores_successor_with_same_id() {
    let broker = Broker::default();
    let (tx_old, _rx_old) = mpsc::unbounded_channel::<WsMessage>();
    let old = broker
        .admit(tx_old, Some("timelapse_req-2".to_string()))
        .unwrap();

    let monitor = tokio::spawn(monitor_timelapse(
        broker.clone(),
        old,
        "req-2".to_string(),
        Duration::from_secs(5),
    ));
    tokio::time::sleep(Duration::from_secs(2)).await;
    broker.remove("timelapse_req-2");

    let (tx_new, mut rx_new) = mpsc::unbounded_channel::<WsMessage>();
    broker
        .admit(tx_new, Some("timelapse_req-2".to_string()))
        .unwrap();
    assert_eq!(next_json(&mut rx_new).await["type"], "connection_established");

    tokio::time::timeout(Duration::from_secs(10), monitor)
        .await
        .expect("monitor kept running")
        .unwrap();
    assert!(rx_new.try_recv().is_err());
}
