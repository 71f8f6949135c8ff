//! Lifecycle supervisor
//!
//! Owns every background loop of the server: the stale-connection sweep, the
//! heartbeat and one loop per registered producer. All of them share one
//! `CancellationToken`; `stop` fires it and waits for each loop to exit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broker::{Broker, ServerMessage};
use crate::config::RealtimeSettings;
use crate::producer::{ProducerSpec, run_producer};

pub struct Supervisor {
    broker: Broker,
    settings: RealtimeSettings,
    producers: Mutex<Vec<ProducerSpec>>,
    started: AtomicBool,
    cancel: CancellationToken,
    tasks: Mutex<Vec<(String, JoinHandle<()>)>>,
}

impl Supervisor {
    pub fn new(broker: Broker, settings: RealtimeSettings) -> Self {
        Self {
            broker,
            settings,
            producers: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Registers a producer to be spawned by `start`. Producers added after
    /// `start` are ignored.
    pub fn add_producer(&self, spec: ProducerSpec) {
        if self.is_started() {
            warn!("Producer for {} registered after start; ignoring", spec.topic);
            return;
        }
        lock(&self.producers).push(spec);
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Token cancelled when the supervisor stops.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawns the sweep, the heartbeat and every registered producer.
    ///
    /// Returns `false` without spawning anything if already started. A stopped
    /// supervisor cannot be started again.
    pub fn start(&self) -> bool {
        if self.cancel.is_cancelled() {
            warn!("Supervisor already stopped; not starting background tasks");
            return false;
        }
        if self.started.swap(true, Ordering::SeqCst) {
            info!("Background tasks already started");
            return false;
        }

        let mut tasks = lock(&self.tasks);
        tasks.push((
            "stale-sweep".to_string(),
            tokio::spawn(sweep_loop(
                self.broker.clone(),
                self.settings.sweep_interval(),
                self.settings.stale_threshold(),
                self.cancel.clone(),
            )),
        ));
        tasks.push((
            "heartbeat".to_string(),
            tokio::spawn(heartbeat_loop(
                self.broker.clone(),
                self.settings.heartbeat_interval(),
                self.cancel.clone(),
            )),
        ));

        for spec in lock(&self.producers).drain(..) {
            let name = format!("producer:{}", spec.topic);
            let handle = tokio::spawn(run_producer(
                self.broker.clone(),
                spec.topic,
                spec.source,
                spec.schedule,
                self.cancel.child_token(),
            ));
            tasks.push((name, handle));
        }

        info!("Started {} background tasks", tasks.len());
        true
    }

    /// Cancels every background loop and waits for all of them to finish.
    pub async fn stop(&self) {
        self.cancel.cancel();

        let tasks: Vec<_> = lock(&self.tasks).drain(..).collect();
        if tasks.is_empty() {
            return;
        }

        for (name, handle) in tasks {
            match handle.await {
                Ok(()) => debug!("Background task {name} stopped"),
                Err(e) => warn!("Background task {name} ended abnormally: {e}"),
            }
        }
        info!("All background tasks stopped");
    }
}

/// Shortest tick either loop will run at.
const MIN_PERIOD: Duration = Duration::from_secs(1);

/// First tick one period from now; a zero period is raised to `MIN_PERIOD`.
fn tick_every(name: &str, period: Duration) -> Interval {
    let period = if period.is_zero() {
        warn!("{name} period is zero; using {MIN_PERIOD:?}");
        MIN_PERIOD
    } else {
        period
    };
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn sweep_loop(
    broker: Broker,
    period: Duration,
    threshold: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tick_every("Stale sweep", period);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let removed = broker.sweep_stale(threshold);
                if !removed.is_empty() {
                    info!("Swept {} stale connections", removed.len());
                }
            }
        }
    }
    debug!("Stale sweep stopped");
}

async fn heartbeat_loop(broker: Broker, period: Duration, cancel: CancellationToken) {
    let mut ticker = tick_every("Heartbeat", period);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let active = broker.connection_count();
                if active > 0 {
                    broker.broadcast_all(&ServerMessage::heartbeat(active));
                }
            }
        }
    }
    debug!("Heartbeat stopped");
}
