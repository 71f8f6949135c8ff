use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;

/// Top-level configuration settings for the application.
///
/// Includes settings for the network listeners, the connection registry and
/// its maintenance loops, and the background producers.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub realtime: RealtimeSettings,
    pub producers: ProducerSettings,
}

/// Configuration settings for the server.
///
/// `port` serves WebSocket connections, `status_port` the HTTP status endpoint.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub status_port: u16,
}

/// Configuration settings for the connection registry and lifecycle loops.
#[derive(Debug, Deserialize, Clone)]
pub struct RealtimeSettings {
    pub max_connections: usize,
    /// Silence on a socket after which a `ping_request` is sent.
    pub receive_timeout_secs: u64,
    pub stale_threshold_secs: u64,
    pub sweep_interval_secs: u64,
    pub heartbeat_interval_secs: u64,
    pub timelapse_stage_delay_ms: u64,
}

/// Poll intervals for each topic producer, and how long each waits after a
/// failed fetch before polling again.
#[derive(Debug, Deserialize, Clone)]
pub struct ProducerSettings {
    pub environmental_interval_secs: u64,
    pub environmental_retry_secs: u64,
    pub hazards_interval_secs: u64,
    pub hazards_retry_secs: u64,
    pub alerts_interval_secs: u64,
    pub alerts_retry_secs: u64,
    pub satellite_interval_secs: u64,
    pub satellite_retry_secs: u64,
}

impl RealtimeSettings {
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_secs(self.receive_timeout_secs)
    }

    pub fn stale_threshold(&self) -> Duration {
        Duration::from_secs(self.stale_threshold_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn timelapse_stage_delay(&self) -> Duration {
        Duration::from_millis(self.timelapse_stage_delay_ms)
    }
}

impl Settings {
    /// Rejects zero periods: a zero tick or poll interval would spin its loop,
    /// and a zero threshold would drop every connection on each sweep.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let realtime = &self.realtime;
        let producers = &self.producers;
        let periods = [
            ("realtime.receive_timeout_secs", realtime.receive_timeout_secs),
            ("realtime.stale_threshold_secs", realtime.stale_threshold_secs),
            ("realtime.sweep_interval_secs", realtime.sweep_interval_secs),
            ("realtime.heartbeat_interval_secs", realtime.heartbeat_interval_secs),
            ("producers.environmental_interval_secs", producers.environmental_interval_secs),
            ("producers.environmental_retry_secs", producers.environmental_retry_secs),
            ("producers.hazards_interval_secs", producers.hazards_interval_secs),
            ("producers.hazards_retry_secs", producers.hazards_retry_secs),
            ("producers.alerts_interval_secs", producers.alerts_interval_secs),
            ("producers.alerts_retry_secs", producers.alerts_retry_secs),
            ("producers.satellite_interval_secs", producers.satellite_interval_secs),
            ("producers.satellite_retry_secs", producers.satellite_retry_secs),
        ];

        match periods.iter().find(|(_, secs)| *secs == 0) {
            Some((name, _)) => Err(ConfigError::Message(format!(
                "{name} must be greater than zero"
            ))),
            None => Ok(()),
        }
    }
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub realtime: Option<PartialRealtimeSettings>,
    pub producers: Option<PartialProducerSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub status_port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct PartialRealtimeSettings {
    pub max_connections: Option<usize>,
    pub receive_timeout_secs: Option<u64>,
    pub stale_threshold_secs: Option<u64>,
    pub sweep_interval_secs: Option<u64>,
    pub heartbeat_interval_secs: Option<u64>,
    pub timelapse_stage_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialProducerSettings {
    pub environmental_interval_secs: Option<u64>,
    pub environmental_retry_secs: Option<u64>,
    pub hazards_interval_secs: Option<u64>,
    pub hazards_retry_secs: Option<u64>,
    pub alerts_interval_secs: Option<u64>,
    pub alerts_retry_secs: Option<u64>,
    pub satellite_interval_secs: Option<u64>,
    pub satellite_retry_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
                status_port: 8081,
            },
            realtime: RealtimeSettings {
                max_connections: 1000,
                receive_timeout_secs: 30,
                stale_threshold_secs: 300,
                sweep_interval_secs: 60,
                heartbeat_interval_secs: 30,
                timelapse_stage_delay_ms: 5000,
            },
            producers: ProducerSettings {
                environmental_interval_secs: 300,
                environmental_retry_secs: 60,
                hazards_interval_secs: 600,
                hazards_retry_secs: 120,
                alerts_interval_secs: 120,
                alerts_retry_secs: 60,
                satellite_interval_secs: 900,
                satellite_retry_secs: 60,
            },
        }
    }
}
